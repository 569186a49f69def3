//! Directory connection settings, editable at runtime through the admin API.
//!
//! Stored as one JSON object in the state store. Validation never rejects a
//! write: invalid fields are reported back and stored anyway.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use url::Url;

use crate::config::Config;
use crate::directory::{Collection, Transport};
use crate::store::StateStore;

/// State-store key of the settings object.
pub const SETTINGS_KEY: &str = "settings.directory";

/// Endpoint plus one operation name or document URL per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct DirectorySettings {
    pub endpoint: String,
    pub facility_list: String,
    pub service_list: String,
    pub insurance_list: String,
    pub facility_insurance_list: String,
    pub facility_service_list: String,
}

/// A field whose value could not be validated. The value is still stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, label: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!(
                "Invalid characters for {label} setting. Please remove special characters or spaces"
            ),
        }
    }
}

impl DirectorySettings {
    /// Initial settings taken from the environment.
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.directory_endpoint.clone().unwrap_or_default(),
            facility_list: config.directory_facility_list.clone().unwrap_or_default(),
            service_list: config.directory_service_list.clone().unwrap_or_default(),
            insurance_list: config.directory_insurance_list.clone().unwrap_or_default(),
            facility_insurance_list: config
                .directory_facility_insurance_list
                .clone()
                .unwrap_or_default(),
            facility_service_list: config
                .directory_facility_service_list
                .clone()
                .unwrap_or_default(),
        }
    }

    /// Raw setting value for a collection.
    pub fn field(&self, collection: Collection) -> &str {
        match collection {
            Collection::Facilities => &self.facility_list,
            Collection::Services => &self.service_list,
            Collection::InsurancePlans => &self.insurance_list,
            Collection::FacilityInsuranceLinks => &self.facility_insurance_list,
            Collection::FacilityServiceLinks => &self.facility_service_list,
        }
    }

    fn field_mut(&mut self, collection: Collection) -> &mut String {
        match collection {
            Collection::Facilities => &mut self.facility_list,
            Collection::Services => &mut self.service_list,
            Collection::InsurancePlans => &mut self.insurance_list,
            Collection::FacilityInsuranceLinks => &mut self.facility_insurance_list,
            Collection::FacilityServiceLinks => &mut self.facility_service_list,
        }
    }

    /// Resolve how `collection` is fetched, or `None` when it is not configured.
    ///
    /// A URL value is a standalone document; anything else names an
    /// operation on the endpoint.
    pub fn transport(&self, collection: Collection) -> Option<Transport> {
        let value = self.field(collection).trim();
        if value.is_empty() {
            return None;
        }
        if looks_like_url(value) {
            return parse_http_url(value).map(Transport::DirectFetch);
        }
        let endpoint = parse_http_url(self.endpoint.trim())?;
        Some(Transport::OperationCall {
            endpoint,
            operation: value.to_string(),
        })
    }

    /// Trim and sanitize every field, collecting validation errors.
    pub fn sanitize(mut self) -> (Self, Vec<ValidationError>) {
        let mut errors = Vec::new();

        self.endpoint = self.endpoint.trim().to_string();
        if !self.endpoint.is_empty() && parse_http_url(&self.endpoint).is_none() {
            errors.push(ValidationError::new("endpoint", "Endpoint"));
        }

        for collection in Collection::ALL {
            let field = self.field_mut(collection);
            let trimmed = field.trim();
            let cleaned = if looks_like_url(trimmed) {
                trimmed.to_string()
            } else {
                strip_low_high(trimmed)
            };
            *field = cleaned;

            let valid = if looks_like_url(field) {
                parse_http_url(field).is_some()
            } else {
                field.chars().all(is_operation_char)
            };
            if !valid {
                errors.push(ValidationError::new(
                    field_name(collection),
                    field_label(collection),
                ));
            }
        }

        (self, errors)
    }

    /// Load the stored settings, if any were saved.
    pub async fn load(store: &dyn StateStore) -> Result<Option<Self>> {
        match store.get(SETTINGS_KEY).await? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).context("stored directory settings are malformed")?,
            )),
            None => Ok(None),
        }
    }

    pub async fn save(&self, store: &dyn StateStore) -> Result<()> {
        store
            .put(SETTINGS_KEY, serde_json::to_value(self)?)
            .await
            .context("failed to store directory settings")
    }

    /// Store `self` unless settings already exist; returns the effective settings.
    pub async fn seed(self, store: &dyn StateStore) -> Result<Self> {
        if let Some(existing) = Self::load(store).await? {
            return Ok(existing);
        }
        self.save(store).await?;
        Ok(self)
    }
}

fn field_name(collection: Collection) -> &'static str {
    match collection {
        Collection::Facilities => "facilityList",
        Collection::Services => "serviceList",
        Collection::InsurancePlans => "insuranceList",
        Collection::FacilityInsuranceLinks => "facilityInsuranceList",
        Collection::FacilityServiceLinks => "facilityServiceList",
    }
}

fn field_label(collection: Collection) -> &'static str {
    match collection {
        Collection::Facilities => "Facility List",
        Collection::Services => "Service List",
        Collection::InsurancePlans => "Insurance List",
        Collection::FacilityInsuranceLinks => "Facility-Insurance List",
        Collection::FacilityServiceLinks => "Facility-Service List",
    }
}

fn looks_like_url(value: &str) -> bool {
    value.contains("://")
}

fn parse_http_url(value: &str) -> Option<Url> {
    Url::parse(value)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

/// Drop ASCII control characters and everything outside ASCII.
fn strip_low_high(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

fn is_operation_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DirectorySettings {
        DirectorySettings {
            endpoint: "https://directory.example.com/Service.asmx?WSDL".to_string(),
            facility_list: "GetFacilities".to_string(),
            service_list: "https://feeds.example.com/services.xml".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_transport_resolution() {
        let s = settings();
        assert!(matches!(
            s.transport(Collection::Facilities),
            Some(Transport::OperationCall { ref operation, .. }) if operation == "GetFacilities"
        ));
        assert!(matches!(
            s.transport(Collection::Services),
            Some(Transport::DirectFetch(_))
        ));
        assert_eq!(s.transport(Collection::InsurancePlans), None);
    }

    #[test]
    fn test_operation_without_endpoint_is_unconfigured() {
        let s = DirectorySettings {
            facility_list: "GetFacilities".to_string(),
            ..Default::default()
        };
        assert_eq!(s.transport(Collection::Facilities), None);
    }

    #[test]
    fn test_sanitize_strips_control_and_extended_chars() {
        let s = DirectorySettings {
            facility_list: " Get\u{7}Facilit\u{e9}ies ".to_string(),
            ..settings()
        };
        let (clean, errors) = s.sanitize();
        assert_eq!(clean.facility_list, "GetFacilities");
        assert_eq!(clean.endpoint, "https://directory.example.com/Service.asmx?WSDL");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_sanitize_reports_but_keeps_invalid_values() {
        let s = DirectorySettings {
            endpoint: "not a url".to_string(),
            insurance_list: "http://".to_string(),
            service_list: "Get Services".to_string(),
            ..Default::default()
        };
        let (clean, errors) = s.sanitize();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["endpoint", "serviceList", "insuranceList"]);
        assert_eq!(clean.endpoint, "not a url");
        assert_eq!(clean.service_list, "Get Services");
        assert!(errors[2].message.contains("Insurance List"));
    }
}
