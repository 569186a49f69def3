//! Postgres-backed store, delegating to the query functions in [`crate::data`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::data::{facilities, kv, terms};
use crate::store::{
    EntityId, EntityStatus, EntityStore, FacilityEntity, NewTerm, StateStore, Taxonomy, Term,
    TermId, TermStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        kv::get(&self.pool, key)
            .await
            .with_context(|| format!("failed to read '{key}'"))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        kv::set(&self.pool, key, &value)
            .await
            .with_context(|| format!("failed to write '{key}'"))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("database is unreachable")?;
        Ok(())
    }
}

#[async_trait]
impl TermStore for PgStore {
    async fn is_registered(&self, taxonomy: Taxonomy) -> Result<bool> {
        terms::is_registered(&self.pool, taxonomy).await
    }

    async fn find_term(&self, taxonomy: Taxonomy, slug: &str) -> Result<Option<Term>> {
        terms::find_by_slug(&self.pool, taxonomy, slug).await
    }

    async fn insert_term(&self, taxonomy: Taxonomy, term: NewTerm) -> Result<TermId> {
        terms::insert(&self.pool, taxonomy, &term).await
    }

    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<Term>> {
        terms::list(&self.pool, taxonomy).await
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_by_facility_id(&self, facility_id: i64) -> Result<Option<EntityId>> {
        facilities::find_by_facility_id(&self.pool, facility_id).await
    }

    async fn insert_entity(
        &self,
        facility_id: i64,
        title: &str,
        status: EntityStatus,
    ) -> Result<EntityId> {
        facilities::insert(&self.pool, facility_id, title, status).await
    }

    async fn update_entity(
        &self,
        id: EntityId,
        title: Option<&str>,
        status: EntityStatus,
    ) -> Result<()> {
        facilities::update(&self.pool, id, title, status).await
    }

    async fn write_fields(&self, id: EntityId, fields: &[(&str, &str)]) -> Result<()> {
        facilities::write_fields(&self.pool, id, fields).await
    }

    async fn replace_tags(
        &self,
        id: EntityId,
        taxonomy: Taxonomy,
        terms: &[TermId],
    ) -> Result<()> {
        facilities::replace_tags(&self.pool, id, taxonomy, terms)
            .await
            .with_context(|| format!("failed to replace {taxonomy} tags of entity {id}"))
    }

    async fn demote_all(&self) -> Result<u64> {
        facilities::demote_all(&self.pool).await
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<FacilityEntity>> {
        facilities::get(&self.pool, id).await
    }

    async fn list_entities(&self, status: Option<EntityStatus>) -> Result<Vec<FacilityEntity>> {
        facilities::list(&self.pool, status).await
    }
}
