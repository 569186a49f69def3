//! HTTP implementation of [`Directory`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, trace};

use crate::directory::xml::parse_document;
use crate::directory::{Collection, Directory, DirectoryError, RawRecord, Transport};
use crate::settings::DirectorySettings;

/// Request options shared by every transport.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Basic-auth credentials sent with every request when set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// XML namespace of the SOAP operations.
    pub namespace: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            username: None,
            password: None,
            namespace: "http://tempuri.org/".to_string(),
        }
    }
}

/// Directory client over reqwest, with transports resolved up front.
pub struct DirectoryClient {
    http: reqwest::Client,
    transports: HashMap<Collection, Transport>,
    options: ClientOptions,
}

impl DirectoryClient {
    pub fn new(
        http: reqwest::Client,
        transports: HashMap<Collection, Transport>,
        options: ClientOptions,
    ) -> Self {
        Self {
            http,
            transports,
            options,
        }
    }

    /// Resolve every collection's transport from the stored settings.
    pub fn from_settings(
        http: reqwest::Client,
        settings: &DirectorySettings,
        options: ClientOptions,
    ) -> Self {
        let transports = Collection::ALL
            .into_iter()
            .filter_map(|c| settings.transport(c).map(|t| (c, t)))
            .collect();
        Self::new(http, transports, options)
    }

    fn soap_envelope(&self, operation: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <{op} xmlns="{ns}" />
  </soap:Body>
</soap:Envelope>"#,
            op = encode_text(operation),
            ns = encode_double_quoted_attribute(&self.options.namespace),
        )
    }

    fn build_request(&self, transport: &Transport) -> reqwest::RequestBuilder {
        let url = transport.request_url();
        let request = match transport {
            Transport::OperationCall { operation, .. } => self
                .http
                .post(url)
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header(
                    "SOAPAction",
                    format!("\"{}{}\"", self.options.namespace, operation),
                )
                .body(self.soap_envelope(operation)),
            Transport::DirectFetch(_) => self.http.get(url),
        };

        let request = match &self.options.username {
            Some(username) => request.basic_auth(username, self.options.password.as_ref()),
            None => request,
        };
        request.timeout(self.options.timeout)
    }
}

#[async_trait]
impl Directory for DirectoryClient {
    fn is_configured(&self, collection: Collection) -> bool {
        self.transports.contains_key(&collection)
    }

    async fn fetch(&self, collection: Collection) -> Result<Vec<RawRecord>, DirectoryError> {
        let transport = self
            .transports
            .get(&collection)
            .ok_or(DirectoryError::NotConfigured(collection))?;
        let url = transport.request_url().to_string();

        debug!(%collection, %transport, "fetching collection");

        let response = self
            .build_request(transport)
            .send()
            .await
            .map_err(|source| DirectoryError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| DirectoryError::Request {
                url: url.clone(),
                source,
            })?;
        trace!(%collection, bytes = body.len(), "reply received");

        let root = parse_document(&body).map_err(|source| DirectoryError::Parse {
            url: url.clone(),
            source,
        })?;

        transport
            .extract_records(&root, collection)
            .ok_or_else(|| DirectoryError::MissingResult {
                url,
                element: collection.result_element().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_envelope_names_operation_and_namespace() {
        let client = DirectoryClient::new(
            reqwest::Client::new(),
            HashMap::new(),
            ClientOptions::default(),
        );
        let envelope = client.soap_envelope("GetFacilities");
        assert!(envelope.contains(r#"<GetFacilities xmlns="http://tempuri.org/" />"#));
        assert!(!client.is_configured(Collection::Facilities));
    }
}
