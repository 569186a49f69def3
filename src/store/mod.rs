//! Storage seams used by the sync pipeline and the web API.
//!
//! [`StateStore`] is a plain key-value store holding refresh state, cached
//! collections and settings. [`TermStore`] and [`EntityStore`] model the
//! tagged-entity store the facilities are projected into.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type TermId = i64;
pub type EntityId = i64;

/// Key-value persistence for JSON documents.
///
/// No compare-and-swap is offered: callers read, modify and write back.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
    /// Verify the backing storage is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Taxonomy namespaces facilities are tagged with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Taxonomy {
    /// Two-level geography: State terms with `State-County` children.
    County,
    Insurance,
    Service,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 3] = [Taxonomy::County, Taxonomy::Insurance, Taxonomy::Service];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::County => "county",
            Self::Insurance => "insurance",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Taxonomy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "county" => Ok(Self::County),
            "insurance" => Ok(Self::Insurance),
            "service" => Ok(Self::Service),
            other => anyhow::bail!("unknown taxonomy '{other}'"),
        }
    }
}

/// A stored taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Term {
    #[ts(type = "number")]
    pub id: TermId,
    pub taxonomy: Taxonomy,
    pub name: String,
    pub slug: String,
    pub description: String,
    #[ts(type = "number | null")]
    pub parent: Option<TermId>,
}

/// A term to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTerm {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parent: Option<TermId>,
}

/// Visibility of a facility entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum EntityStatus {
    Published,
    Draft,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
        }
    }

    pub fn from_db(s: &str) -> Self {
        if s == "published" {
            Self::Published
        } else {
            Self::Draft
        }
    }
}

/// A facility content entity with its flat fields and tag sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityEntity {
    pub id: EntityId,
    pub facility_id: i64,
    pub title: String,
    pub status: EntityStatus,
    pub fields: BTreeMap<String, String>,
    pub tags: BTreeMap<Taxonomy, Vec<TermId>>,
}

impl FacilityEntity {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn tags(&self, taxonomy: Taxonomy) -> &[TermId] {
        self.tags.get(&taxonomy).map_or(&[], Vec::as_slice)
    }
}

/// Taxonomy term storage.
#[async_trait]
pub trait TermStore: Send + Sync {
    /// Whether the taxonomy namespace exists in this store.
    async fn is_registered(&self, taxonomy: Taxonomy) -> Result<bool>;
    async fn find_term(&self, taxonomy: Taxonomy, slug: &str) -> Result<Option<Term>>;
    /// Insert a term. Slugs are unique per taxonomy.
    async fn insert_term(&self, taxonomy: Taxonomy, term: NewTerm) -> Result<TermId>;
    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<Term>>;
}

/// Facility entity storage, keyed by the directory's FacilityID.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_by_facility_id(&self, facility_id: i64) -> Result<Option<EntityId>>;
    async fn insert_entity(
        &self,
        facility_id: i64,
        title: &str,
        status: EntityStatus,
    ) -> Result<EntityId>;
    /// Set the status, and the title when one is given.
    async fn update_entity(
        &self,
        id: EntityId,
        title: Option<&str>,
        status: EntityStatus,
    ) -> Result<()>;
    /// Upsert the given fields; fields not listed are left as they are.
    async fn write_fields(&self, id: EntityId, fields: &[(&str, &str)]) -> Result<()>;
    /// Replace the entity's whole tag set for one taxonomy.
    async fn replace_tags(&self, id: EntityId, taxonomy: Taxonomy, terms: &[TermId])
    -> Result<()>;
    /// Mark every entity as draft; returns how many were published before.
    async fn demote_all(&self) -> Result<u64>;
    async fn get_entity(&self, id: EntityId) -> Result<Option<FacilityEntity>>;
    async fn list_entities(&self, status: Option<EntityStatus>) -> Result<Vec<FacilityEntity>>;
}

/// The three store handles, usually backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub state: Arc<dyn StateStore>,
    pub terms: Arc<dyn TermStore>,
    pub entities: Arc<dyn EntityStore>,
}

impl Stores {
    /// Share one in-memory store across all three roles.
    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            state: store.clone(),
            terms: store.clone(),
            entities: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            state: store.clone(),
            terms: store.clone(),
            entities: store,
        }
    }
}
