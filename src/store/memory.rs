//! In-process store implementing all three storage traits.
//!
//! Used for the ephemeral mode (no `DATABASE_URL`) and by tests. Everything
//! lives behind one mutex that is never held across an await point.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::store::{
    EntityId, EntityStatus, EntityStore, FacilityEntity, NewTerm, StateStore, Taxonomy, Term,
    TermId, TermStore,
};

#[derive(Default)]
struct Inner {
    kv: HashMap<String, serde_json::Value>,
    taxonomies: BTreeSet<Taxonomy>,
    terms: Vec<Term>,
    entities: BTreeMap<EntityId, FacilityEntity>,
    next_term_id: TermId,
    next_entity_id: EntityId,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store with every taxonomy registered.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                taxonomies: Taxonomy::ALL.into_iter().collect(),
                next_term_id: 1,
                next_entity_id: 1,
                ..Inner::default()
            }),
        }
    }

    /// Unregister a taxonomy, as if the namespace had never been created.
    pub fn without_taxonomy(self, taxonomy: Taxonomy) -> Self {
        self.lock().taxonomies.remove(&taxonomy);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entity<T>(&self, id: EntityId, f: impl FnOnce(&mut FacilityEntity) -> T) -> Result<T> {
        let mut inner = self.lock();
        match inner.entities.get_mut(&id) {
            Some(entity) => Ok(f(entity)),
            None => bail!("facility entity {id} does not exist"),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.lock().kv.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.lock().kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TermStore for MemoryStore {
    async fn is_registered(&self, taxonomy: Taxonomy) -> Result<bool> {
        Ok(self.lock().taxonomies.contains(&taxonomy))
    }

    async fn find_term(&self, taxonomy: Taxonomy, slug: &str) -> Result<Option<Term>> {
        Ok(self
            .lock()
            .terms
            .iter()
            .find(|t| t.taxonomy == taxonomy && t.slug == slug)
            .cloned())
    }

    async fn insert_term(&self, taxonomy: Taxonomy, term: NewTerm) -> Result<TermId> {
        let mut inner = self.lock();
        if !inner.taxonomies.contains(&taxonomy) {
            bail!("taxonomy '{taxonomy}' is not registered");
        }
        if inner
            .terms
            .iter()
            .any(|t| t.taxonomy == taxonomy && t.slug == term.slug)
        {
            bail!("term '{}' already exists in '{taxonomy}'", term.slug);
        }
        if let Some(parent) = term.parent
            && !inner.terms.iter().any(|t| t.id == parent)
        {
            bail!("parent term {parent} does not exist");
        }

        let id = inner.next_term_id;
        inner.next_term_id += 1;
        inner.terms.push(Term {
            id,
            taxonomy,
            name: term.name,
            slug: term.slug,
            description: term.description,
            parent: term.parent,
        });
        Ok(id)
    }

    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<Term>> {
        let mut terms: Vec<Term> = self
            .lock()
            .terms
            .iter()
            .filter(|t| t.taxonomy == taxonomy)
            .cloned()
            .collect();
        terms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(terms)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_facility_id(&self, facility_id: i64) -> Result<Option<EntityId>> {
        Ok(self
            .lock()
            .entities
            .values()
            .find(|e| e.facility_id == facility_id)
            .map(|e| e.id))
    }

    async fn insert_entity(
        &self,
        facility_id: i64,
        title: &str,
        status: EntityStatus,
    ) -> Result<EntityId> {
        let mut inner = self.lock();
        if inner.entities.values().any(|e| e.facility_id == facility_id) {
            bail!("facility {facility_id} already has an entity");
        }
        let id = inner.next_entity_id;
        inner.next_entity_id += 1;
        inner.entities.insert(
            id,
            FacilityEntity {
                id,
                facility_id,
                title: title.to_string(),
                status,
                fields: BTreeMap::new(),
                tags: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn update_entity(
        &self,
        id: EntityId,
        title: Option<&str>,
        status: EntityStatus,
    ) -> Result<()> {
        self.with_entity(id, |entity| {
            if let Some(title) = title {
                entity.title = title.to_string();
            }
            entity.status = status;
        })
    }

    async fn write_fields(&self, id: EntityId, fields: &[(&str, &str)]) -> Result<()> {
        self.with_entity(id, |entity| {
            for (name, value) in fields {
                entity.fields.insert(name.to_string(), value.to_string());
            }
        })
    }

    async fn replace_tags(
        &self,
        id: EntityId,
        taxonomy: Taxonomy,
        terms: &[TermId],
    ) -> Result<()> {
        self.with_entity(id, |entity| {
            entity.tags.insert(taxonomy, terms.to_vec());
        })
    }

    async fn demote_all(&self) -> Result<u64> {
        let mut inner = self.lock();
        let mut demoted = 0;
        for entity in inner.entities.values_mut() {
            if entity.status == EntityStatus::Published {
                entity.status = EntityStatus::Draft;
                demoted += 1;
            }
        }
        Ok(demoted)
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<FacilityEntity>> {
        Ok(self.lock().entities.get(&id).cloned())
    }

    async fn list_entities(&self, status: Option<EntityStatus>) -> Result<Vec<FacilityEntity>> {
        Ok(self
            .lock()
            .entities
            .values()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect())
    }
}
