//! Client for the remote facility directory.
//!
//! The directory exposes five collections. Each can be reached either through
//! a SOAP operation on a shared endpoint or as a standalone XML document; see
//! [`transport::Transport`].

pub mod client;
pub mod errors;
pub mod transport;
pub mod xml;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use client::{ClientOptions, DirectoryClient};
pub use errors::DirectoryError;
pub use transport::Transport;

/// One item of a reply: scalar field name to raw text.
pub type RawRecord = BTreeMap<String, String>;

/// The collections offered by the directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum Collection {
    Facilities,
    Services,
    InsurancePlans,
    FacilityInsuranceLinks,
    FacilityServiceLinks,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Facilities,
        Collection::Services,
        Collection::InsurancePlans,
        Collection::FacilityInsuranceLinks,
        Collection::FacilityServiceLinks,
    ];

    /// Stable snake_case name, used for persisted keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Facilities => "facility_list",
            Self::Services => "services_list",
            Self::InsurancePlans => "insurances_list",
            Self::FacilityInsuranceLinks => "facility_insurance",
            Self::FacilityServiceLinks => "facility_service",
        }
    }

    /// Element wrapping the item list in an operation reply.
    pub fn result_element(self) -> &'static str {
        match self {
            Self::Facilities => "GetFacilitiesResult",
            Self::Services => "GetServicesResult",
            Self::InsurancePlans => "GetInsCompaniesResult",
            Self::FacilityInsuranceLinks => "GetFacilityInsCompaniesResult",
            Self::FacilityServiceLinks => "GetFacilityServicesResult",
        }
    }

    /// Element name of a single item.
    pub fn item_tag(self) -> &'static str {
        match self {
            Self::Facilities => "Facility",
            Self::Services => "Service",
            Self::InsurancePlans => "Insurance",
            Self::FacilityInsuranceLinks => "FacilityInsurance",
            Self::FacilityServiceLinks => "FacilityService",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of raw directory records.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether a transport is configured for `collection`.
    fn is_configured(&self, collection: Collection) -> bool;

    /// Fetch every record of `collection`.
    async fn fetch(&self, collection: Collection) -> Result<Vec<RawRecord>, DirectoryError>;
}
