//! How a collection is fetched and where its records live in the reply.

use std::fmt;

use url::Url;

use crate::directory::xml::XmlNode;
use crate::directory::{Collection, RawRecord};

/// Generic element name used by document-style feeds.
const GENERIC_ITEM_TAG: &str = "Item";

/// A resolved way of fetching one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// SOAP 1.1 call of `operation` against the service endpoint.
    OperationCall { endpoint: Url, operation: String },
    /// Plain GET of an XML document listing the records.
    DirectFetch(Url),
}

impl Transport {
    /// The URL a request for this transport is sent to.
    ///
    /// A `?wsdl` query on the endpoint is dropped, since the description
    /// document and the service share the same path.
    pub fn request_url(&self) -> Url {
        match self {
            Self::OperationCall { endpoint, .. } => {
                let mut url = endpoint.clone();
                if url.query().is_some_and(|q| q.eq_ignore_ascii_case("wsdl")) {
                    url.set_query(None);
                }
                url
            }
            Self::DirectFetch(url) => url.clone(),
        }
    }

    /// Locate the records of `collection` in a parsed reply.
    ///
    /// Returns `None` when an operation reply lacks its result element.
    /// Documents without any matching item are an empty collection.
    pub fn extract_records(&self, root: &XmlNode, collection: Collection) -> Option<Vec<RawRecord>> {
        let container = match self {
            Self::OperationCall { operation, .. } => root
                .find(collection.result_element())
                .or_else(|| root.find(&format!("{operation}Result")))?,
            Self::DirectFetch(_) => {
                if root.children.iter().any(|c| is_item(c, collection)) {
                    root
                } else {
                    root.find(collection.result_element()).unwrap_or(root)
                }
            }
        };

        Some(
            container
                .children
                .iter()
                .filter(|c| is_item(c, collection))
                .map(record_from_item)
                .collect(),
        )
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationCall { endpoint, operation } => write!(f, "{operation}@{endpoint}"),
            Self::DirectFetch(url) => write!(f, "{url}"),
        }
    }
}

fn is_item(node: &XmlNode, collection: Collection) -> bool {
    node.name == collection.item_tag() || node.name == GENERIC_ITEM_TAG
}

/// Scalar children become fields; nested lists (e.g. `InsuranceList`) are dropped.
fn record_from_item(item: &XmlNode) -> RawRecord {
    item.children
        .iter()
        .filter(|field| field.is_leaf())
        .map(|field| (field.name.clone(), field.text.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::xml::parse_document;

    fn operation(name: &str) -> Transport {
        Transport::OperationCall {
            endpoint: Url::parse("https://directory.example.com/Service.asmx?WSDL").unwrap(),
            operation: name.to_string(),
        }
    }

    #[test]
    fn test_request_url_strips_wsdl_query() {
        let url = operation("GetFacilities").request_url();
        assert_eq!(url.as_str(), "https://directory.example.com/Service.asmx");

        let direct = Transport::DirectFetch(Url::parse("https://x.test/f.xml?v=2").unwrap());
        assert_eq!(direct.request_url().query(), Some("v=2"));
    }

    #[test]
    fn test_operation_reply_records_skip_nested_lists() {
        let root = parse_document(
            "<Envelope><Body><GetFacilitiesResponse><GetFacilitiesResult>\
             <Facility><FacilityID>7</FacilityID><FacilityName>Clinic A</FacilityName>\
             <InsuranceList><Insurance><InsID>1</InsID></Insurance></InsuranceList></Facility>\
             </GetFacilitiesResult></GetFacilitiesResponse></Body></Envelope>",
        )
        .unwrap();

        let records = operation("GetFacilities")
            .extract_records(&root, Collection::Facilities)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("FacilityName").map(String::as_str), Some("Clinic A"));
        assert!(!records[0].contains_key("InsuranceList"));
    }

    #[test]
    fn test_operation_reply_falls_back_to_operation_result_name() {
        let root = parse_document(
            "<Envelope><Body><ListPlansResult><Insurance><InsID>4</InsID></Insurance>\
             </ListPlansResult></Body></Envelope>",
        )
        .unwrap();
        let records = operation("ListPlans")
            .extract_records(&root, Collection::InsurancePlans)
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_operation_reply_without_result_is_none() {
        let root = parse_document("<Envelope><Body><Fault/></Body></Envelope>").unwrap();
        assert!(
            operation("GetServices")
                .extract_records(&root, Collection::Services)
                .is_none()
        );
    }

    #[test]
    fn test_document_accepts_generic_and_named_items() {
        let transport = Transport::DirectFetch(Url::parse("https://x.test/s.xml").unwrap());
        let root = parse_document(
            "<Services><Item><ServiceID>1</ServiceID></Item>\
             <Service><ServiceID>2</ServiceID></Service></Services>",
        )
        .unwrap();
        let records = transport
            .extract_records(&root, Collection::Services)
            .unwrap();
        assert_eq!(records.len(), 2);

        let empty = parse_document("<Services/>").unwrap();
        assert_eq!(
            transport.extract_records(&empty, Collection::Services),
            Some(vec![])
        );
    }
}
