//! Last-good snapshots of each collection, and the gated refresh around them.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::directory::Directory;
use crate::store::StateStore;
use crate::sync::gate::{RefreshKey, StalenessGate};
use crate::sync::normalize::Snapshot;

#[derive(Clone)]
pub struct CollectionCache {
    store: Arc<dyn StateStore>,
}

impl CollectionCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn key<S: Snapshot>() -> String {
        format!("cache.{}", S::COLLECTION.as_str())
    }

    pub async fn get<S: Snapshot>(&self) -> Result<Option<S>> {
        let key = Self::key::<S>();
        match self.store.get(&key).await? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).with_context(|| format!("cached '{key}' is malformed"))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn put<S: Snapshot>(&self, snapshot: &S) -> Result<()> {
        let key = Self::key::<S>();
        self.store
            .put(&key, serde_json::to_value(snapshot)?)
            .await
            .with_context(|| format!("failed to store '{key}'"))
    }

    /// Return the collection, fetching a new snapshot first when its gate is due.
    ///
    /// A failed fetch keeps the previous snapshot and still advances the
    /// gate, so the next attempt waits a full interval. Collections without
    /// a configured transport are never fetched and leave the gate untouched.
    #[instrument(skip_all, fields(collection = %S::COLLECTION))]
    pub async fn refresh<S: Snapshot>(
        &self,
        gate: &StalenessGate,
        directory: &dyn Directory,
    ) -> Result<S> {
        let key = RefreshKey::from(S::COLLECTION);
        let cached = self.get::<S>().await?;

        if !directory.is_configured(S::COLLECTION) {
            return Ok(cached.unwrap_or_default());
        }

        // A lock without any snapshot was left by a refresh that never finished.
        if cached.is_none() && gate.state(key).await?.is_some_and(|state| state.locked) {
            gate.unlock(key).await?;
        }

        if !gate.is_due(key).await? {
            return Ok(cached.unwrap_or_default());
        }

        gate.acquire(key).await?;

        let snapshot = match directory.fetch(S::COLLECTION).await {
            Ok(records) => {
                let snapshot = S::from_records(records);
                match self.put(&snapshot).await {
                    Ok(()) => info!(count = snapshot.len(), "Collection refreshed"),
                    Err(e) => warn!(error = ?e, "Fetched collection could not be cached"),
                }
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Directory fetch failed, keeping previous snapshot");
                cached.unwrap_or_default()
            }
        };

        gate.release(key).await?;
        Ok(snapshot)
    }
}
