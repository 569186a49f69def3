//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use locator::directory::{Collection, Directory, DirectoryError, RawRecord};
use locator::store::{MemoryStore, StateStore, Stores};
use locator::sync::Pipeline;
use locator::sync::clock::ManualClock;

/// Build a raw record from field pairs.
pub fn record(fields: &[(&str, &str)]) -> RawRecord {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// A facility item with the fields the importer cares about most.
pub fn facility(id: i64, name: &str, state: &str, county: &str, active: bool) -> RawRecord {
    let id = id.to_string();
    record(&[
        ("FacilityID", &id),
        ("FacilityName", name),
        ("State", state),
        ("County", county),
        ("Active", if active { "1" } else { "0" }),
    ])
}

pub fn service(id: i64, name: &str) -> RawRecord {
    record(&[("ServiceID", &id.to_string()), ("ServiceName", name)])
}

pub fn plan(id: i64, name: &str) -> RawRecord {
    record(&[("InsID", &id.to_string()), ("InsName", name)])
}

pub fn insurance_link(facility_id: i64, ins_id: i64) -> RawRecord {
    record(&[
        ("FacilityID", &facility_id.to_string()),
        ("InsID", &ins_id.to_string()),
    ])
}

pub fn service_link(facility_id: i64, service_id: i64) -> RawRecord {
    record(&[
        ("FacilityID", &facility_id.to_string()),
        ("ServiceID", &service_id.to_string()),
    ])
}

/// Noon on a fixed day, so seeded states are comfortably due.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

enum Reply {
    Records(Vec<RawRecord>),
    Fail,
}

/// Scripted [`Directory`] that counts fetches per collection.
#[derive(Default)]
pub struct FakeDirectory {
    replies: Mutex<HashMap<Collection, Reply>>,
    fetches: Mutex<HashMap<Collection, usize>>,
    total: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, collection: Collection, records: Vec<RawRecord>) {
        self.replies
            .lock()
            .unwrap()
            .insert(collection, Reply::Records(records));
    }

    /// Keep the collection configured, but fail every fetch.
    pub fn fail(&self, collection: Collection) {
        self.replies.lock().unwrap().insert(collection, Reply::Fail);
    }

    pub fn unconfigure(&self, collection: Collection) {
        self.replies.lock().unwrap().remove(&collection);
    }

    /// Sleep this long before answering any fetch.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fetches(&self, collection: Collection) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    fn is_configured(&self, collection: Collection) -> bool {
        self.replies.lock().unwrap().contains_key(&collection)
    }

    async fn fetch(&self, collection: Collection) -> Result<Vec<RawRecord>, DirectoryError> {
        *self.fetches.lock().unwrap().entry(collection).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.replies.lock().unwrap().get(&collection) {
            Some(Reply::Records(records)) => Ok(records.clone()),
            Some(Reply::Fail) => Err(DirectoryError::Status {
                status: 503,
                url: format!("http://directory.test/{collection}"),
            }),
            None => Err(DirectoryError::NotConfigured(collection)),
        }
    }
}

/// Directory serving one active facility in Franklin County, Ohio.
pub fn clinic_a_directory() -> FakeDirectory {
    let directory = FakeDirectory::new();
    directory.set(
        Collection::Facilities,
        vec![{
            let mut clinic = facility(10, "Clinic A", "OH", "Franklin", true);
            clinic.insert("Phone".to_owned(), "555".to_owned());
            clinic
        }],
    );
    directory.set(Collection::Services, vec![service(7, "Counseling")]);
    directory.set(Collection::InsurancePlans, vec![plan(3, "Acme Health")]);
    directory.set(
        Collection::FacilityInsuranceLinks,
        vec![insurance_link(10, 3)],
    );
    directory.set(Collection::FacilityServiceLinks, vec![service_link(10, 7)]);
    directory
}

/// Everything a pipeline test needs to poke at.
pub struct Harness {
    pub directory: Arc<FakeDirectory>,
    pub stores: Stores,
    pub clock: Arc<ManualClock>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(directory: FakeDirectory) -> Self {
        Self::with_store(directory, MemoryStore::new())
    }

    pub fn with_store(directory: FakeDirectory, store: MemoryStore) -> Self {
        Self::from_stores(directory, Stores::memory(store))
    }

    /// Build the stores from a fresh [`MemoryStore`] with `wire`.
    pub fn with_stores(directory: FakeDirectory, wire: impl FnOnce(MemoryStore) -> Stores) -> Self {
        Self::from_stores(directory, wire(MemoryStore::new()))
    }

    fn from_stores(directory: FakeDirectory, stores: Stores) -> Self {
        let directory = Arc::new(directory);
        let clock = Arc::new(ManualClock::new(start_time()));
        let pipeline = Pipeline::new(directory.clone(), stores.clone(), clock.clone());
        Self {
            directory,
            stores,
            clock,
            pipeline,
        }
    }

    /// Step past the refresh interval so every unlocked key is due again.
    pub fn next_day(&self) {
        self.clock.advance(chrono::TimeDelta::hours(25));
    }

    pub fn with_import_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline = self.pipeline.with_import_timeout(timeout);
        self
    }
}

/// State store that yields to the runtime before every access, so
/// concurrent callers interleave between their reads and writes.
pub struct YieldingState {
    inner: Arc<MemoryStore>,
}

impl YieldingState {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StateStore for YieldingState {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.inner.put(key, value).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}
