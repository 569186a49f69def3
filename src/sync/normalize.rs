//! Normalized snapshots of the five directory collections.
//!
//! Raw records become keyed maps here. Text values are HTML-entity escaped on
//! the way in; numeric identity fields become the map keys. Records whose id
//! does not parse are dropped.

use std::collections::{BTreeMap, BTreeSet};

use html_escape::{decode_html_entities, encode_quoted_attribute};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::directory::{Collection, RawRecord};

/// A cached, normalized collection.
pub trait Snapshot: Default + Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn from_records(records: Vec<RawRecord>) -> Self;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Children of a facility item that are lists, not fields.
const NESTED_LISTS: [&str; 2] = ["InsuranceList", "ServiceList"];

fn escape(value: &str) -> String {
    encode_quoted_attribute(value).into_owned()
}

/// Undo the ingest escaping, for display and slugging.
pub fn unescape(value: &str) -> String {
    decode_html_entities(value).into_owned()
}

fn parse_id(record: &RawRecord, field: &str) -> Option<i64> {
    let id = record.get(field)?.trim().parse().ok();
    if id.is_none() {
        trace!(field, value = ?record.get(field), "Dropping record with unparseable id");
    }
    id
}

/// One facility's escaped scalar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityRecord(BTreeMap<String, String>);

impl FacilityRecord {
    pub fn from_fields<K: Into<String>, V: AsRef<str>>(
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), escape(v.as_ref())))
                .collect(),
        )
    }

    /// Escaped value of a field, `None` when absent or empty.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Unescaped value of a field, `None` when absent or empty.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).map(|v| unescape(v.trim()))
    }

    pub fn name(&self) -> Option<String> {
        self.text("FacilityName")
    }

    pub fn state(&self) -> Option<String> {
        self.text("State")
    }

    pub fn county(&self) -> Option<String> {
        self.text("County")
    }

    /// `Active` of `"1"` or `"true"`; anything else, including absence, is inactive.
    pub fn is_active(&self) -> bool {
        self.get("Active")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facilities(BTreeMap<i64, FacilityRecord>);

impl Facilities {
    pub fn get(&self, facility_id: i64) -> Option<&FacilityRecord> {
        self.0.get(&facility_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &FacilityRecord)> {
        self.0.iter().map(|(id, r)| (*id, r))
    }
}

impl Snapshot for Facilities {
    const COLLECTION: Collection = Collection::Facilities;

    fn from_records(records: Vec<RawRecord>) -> Self {
        let mut facilities = BTreeMap::new();
        for mut record in records {
            for nested in NESTED_LISTS {
                record.remove(nested);
            }
            let Some(id) = parse_id(&record, "FacilityID") else {
                continue;
            };
            facilities.insert(id, FacilityRecord::from_fields(record));
        }
        Self(facilities)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

fn name_list(records: Vec<RawRecord>, id_field: &str, name_field: &str) -> BTreeMap<i64, String> {
    records
        .iter()
        .filter_map(|record| {
            let id = parse_id(record, id_field)?;
            let name = record.get(name_field).map_or("", String::as_str);
            Some((id, escape(name)))
        })
        .collect()
}

fn link_list(records: Vec<RawRecord>, target_field: &str) -> BTreeMap<i64, BTreeSet<i64>> {
    let mut links: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for record in &records {
        let (Some(facility_id), Some(target)) =
            (parse_id(record, "FacilityID"), parse_id(record, target_field))
        else {
            continue;
        };
        links.entry(facility_id).or_default().insert(target);
    }
    links
}

/// Service id to escaped service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Services(BTreeMap<i64, String>);

impl Services {
    pub fn name(&self, id: i64) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.0.iter().map(|(id, n)| (*id, n.as_str()))
    }
}

impl Snapshot for Services {
    const COLLECTION: Collection = Collection::Services;

    fn from_records(records: Vec<RawRecord>) -> Self {
        Self(name_list(records, "ServiceID", "ServiceName"))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Insurance id to escaped plan name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsurancePlans(BTreeMap<i64, String>);

impl InsurancePlans {
    pub fn name(&self, id: i64) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.0.iter().map(|(id, n)| (*id, n.as_str()))
    }
}

impl Snapshot for InsurancePlans {
    const COLLECTION: Collection = Collection::InsurancePlans;

    fn from_records(records: Vec<RawRecord>) -> Self {
        Self(name_list(records, "InsID", "InsName"))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// FacilityID to the set of linked insurance ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityInsurance(BTreeMap<i64, BTreeSet<i64>>);

impl FacilityInsurance {
    pub fn linked(&self, facility_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.0.get(&facility_id).into_iter().flatten().copied()
    }
}

impl Snapshot for FacilityInsurance {
    const COLLECTION: Collection = Collection::FacilityInsuranceLinks;

    fn from_records(records: Vec<RawRecord>) -> Self {
        Self(link_list(records, "InsID"))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// FacilityID to the set of linked service ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityServices(BTreeMap<i64, BTreeSet<i64>>);

impl FacilityServices {
    pub fn linked(&self, facility_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.0.get(&facility_id).into_iter().flatten().copied()
    }
}

impl Snapshot for FacilityServices {
    const COLLECTION: Collection = Collection::FacilityServiceLinks;

    fn from_records(records: Vec<RawRecord>) -> Self {
        Self(link_list(records, "ServiceID"))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}
