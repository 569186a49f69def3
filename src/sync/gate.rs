//! Per-key staleness tracking with a weak, non-atomic lock.
//!
//! Every key's state lives in one JSON object under [`REFRESH_STATE_KEY`],
//! read and written back whole on each transition. Two callers racing on the
//! same key can both see it unlocked and both run; nothing here prevents that.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

use crate::directory::Collection;
use crate::store::StateStore;
use crate::sync::clock::Clock;

/// State-store key of the refresh state object.
pub const REFRESH_STATE_KEY: &str = "settings.refresh_state";

/// A refresh is due once this much time has passed since the last run.
pub const REFRESH_INTERVAL: TimeDelta = TimeDelta::seconds(86_400);

/// Everything with its own staleness clock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub enum RefreshKey {
    #[serde(rename = "facility_list")]
    Facilities,
    #[serde(rename = "services_list")]
    Services,
    #[serde(rename = "insurances_list")]
    InsurancePlans,
    #[serde(rename = "facility_insurance")]
    FacilityInsuranceLinks,
    #[serde(rename = "facility_service")]
    FacilityServiceLinks,
    #[serde(rename = "register_custom_terms")]
    CustomTerms,
    #[serde(rename = "import_facilities")]
    FacilityImport,
}

impl RefreshKey {
    pub const ALL: [RefreshKey; 7] = [
        RefreshKey::Facilities,
        RefreshKey::Services,
        RefreshKey::InsurancePlans,
        RefreshKey::FacilityInsuranceLinks,
        RefreshKey::FacilityServiceLinks,
        RefreshKey::CustomTerms,
        RefreshKey::FacilityImport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomTerms => "register_custom_terms",
            Self::FacilityImport => "import_facilities",
            other => other.collection().map_or("", Collection::as_str),
        }
    }

    /// The directory collection this key refreshes, if any.
    pub fn collection(self) -> Option<Collection> {
        match self {
            Self::Facilities => Some(Collection::Facilities),
            Self::Services => Some(Collection::Services),
            Self::InsurancePlans => Some(Collection::InsurancePlans),
            Self::FacilityInsuranceLinks => Some(Collection::FacilityInsuranceLinks),
            Self::FacilityServiceLinks => Some(Collection::FacilityServiceLinks),
            Self::CustomTerms | Self::FacilityImport => None,
        }
    }
}

impl From<Collection> for RefreshKey {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::Facilities => Self::Facilities,
            Collection::Services => Self::Services,
            Collection::InsurancePlans => Self::InsurancePlans,
            Collection::FacilityInsuranceLinks => Self::FacilityInsuranceLinks,
            Collection::FacilityServiceLinks => Self::FacilityServiceLinks,
        }
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshState {
    pub last_run_at: DateTime<Utc>,
    pub locked: bool,
}

impl RefreshState {
    /// Initial state: last run yesterday at 00:01, so the first check is due.
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let yesterday = now.date_naive() - TimeDelta::days(1);
        Self {
            last_run_at: (yesterday.and_time(NaiveTime::MIN) + TimeDelta::minutes(1)).and_utc(),
            locked: false,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.locked && now - self.last_run_at > REFRESH_INTERVAL
    }
}

type StateMap = BTreeMap<RefreshKey, RefreshState>;

/// How a gated body went.
#[derive(Debug)]
pub enum GateOutcome<T> {
    /// The key was not due; nothing ran.
    NotDue,
    Ran(T),
    /// The body hit its ceiling and was abandoned with the lock still held.
    TimedOut,
}

#[derive(Clone)]
pub struct StalenessGate {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl StalenessGate {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn load(&self) -> Result<StateMap> {
        match self.store.get(REFRESH_STATE_KEY).await? {
            Some(value) => serde_json::from_value(value).context("refresh state is malformed"),
            None => Ok(StateMap::new()),
        }
    }

    async fn save(&self, states: &StateMap) -> Result<()> {
        self.store
            .put(REFRESH_STATE_KEY, serde_json::to_value(states)?)
            .await
            .context("failed to persist refresh state")
    }

    /// Current state of every key that has been observed.
    pub async fn states(&self) -> Result<BTreeMap<RefreshKey, RefreshState>> {
        self.load().await
    }

    pub async fn state(&self, key: RefreshKey) -> Result<Option<RefreshState>> {
        Ok(self.load().await?.get(&key).copied())
    }

    /// Whether `key` should refresh now. The first observation of a key
    /// seeds its state and is always due.
    pub async fn is_due(&self, key: RefreshKey) -> Result<bool> {
        let now = self.now();
        let mut states = self.load().await?;
        match states.get(&key) {
            Some(state) => Ok(state.is_due(now)),
            None => {
                let state = RefreshState::seeded(now);
                states.insert(key, state);
                self.save(&states).await?;
                debug!(key = %key, last_run_at = %state.last_run_at, "Seeded refresh state");
                Ok(true)
            }
        }
    }

    /// Clear a held lock, keeping the last run time.
    pub async fn unlock(&self, key: RefreshKey) -> Result<()> {
        let mut states = self.load().await?;
        if let Some(state) = states.get_mut(&key)
            && state.locked
        {
            state.locked = false;
            self.save(&states).await?;
            warn!(key = %key, "Cleared a lock held without a cached snapshot");
        }
        Ok(())
    }

    /// Mark `key` as running. Persisted before any work starts.
    pub async fn acquire(&self, key: RefreshKey) -> Result<()> {
        let now = self.now();
        let mut states = self.load().await?;
        states
            .entry(key)
            .or_insert_with(|| RefreshState::seeded(now))
            .locked = true;
        self.save(&states).await
    }

    /// Clear the lock and record `now` as the last run.
    pub async fn release(&self, key: RefreshKey) -> Result<()> {
        let now = self.now();
        let mut states = self.load().await?;
        states.insert(
            key,
            RefreshState {
                last_run_at: now,
                locked: false,
            },
        );
        self.save(&states).await
    }

    /// Run `body` under the gate when `key` is due.
    ///
    /// With a `ceiling`, a body that overruns is dropped and the lock is left
    /// set, the same as a process killed mid-refresh.
    pub async fn run<T>(
        &self,
        key: RefreshKey,
        ceiling: Option<Duration>,
        body: impl Future<Output = T>,
    ) -> Result<GateOutcome<T>> {
        if !self.is_due(key).await? {
            return Ok(GateOutcome::NotDue);
        }
        self.acquire(key).await?;

        let output = match ceiling {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(key = %key, ceiling = ?limit, "Refresh exceeded its ceiling, lock left held");
                    return Ok(GateOutcome::TimedOut);
                }
            },
            None => body.await,
        };

        self.release(key).await?;
        Ok(GateOutcome::Ran(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sync::clock::ManualClock;
    use chrono::TimeZone;

    fn gate_at(now: DateTime<Utc>) -> (StalenessGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let gate = StalenessGate::new(Arc::new(MemoryStore::new()), clock.clone());
        (gate, clock)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_seed_is_yesterday_one_minute_past_midnight() {
        let seeded = RefreshState::seeded(noon());
        assert_eq!(
            seeded.last_run_at,
            Utc.with_ymd_and_hms(2024, 3, 9, 0, 1, 0).unwrap()
        );
        assert!(!seeded.locked);
    }

    #[test]
    fn test_due_boundary_is_strict() {
        let state = RefreshState {
            last_run_at: noon(),
            locked: false,
        };
        assert!(!state.is_due(noon() + REFRESH_INTERVAL));
        assert!(state.is_due(noon() + REFRESH_INTERVAL + TimeDelta::seconds(1)));

        let locked = RefreshState {
            locked: true,
            ..state
        };
        assert!(!locked.is_due(noon() + TimeDelta::days(30)));
    }

    #[tokio::test]
    async fn test_first_observation_is_due_and_seeds() {
        let (gate, _) = gate_at(noon());
        assert!(gate.is_due(RefreshKey::CustomTerms).await.unwrap());
        let state = gate.state(RefreshKey::CustomTerms).await.unwrap().unwrap();
        assert_eq!(state, RefreshState::seeded(noon()));
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let (gate, clock) = gate_at(noon());
        let key = RefreshKey::Services;
        assert!(gate.is_due(key).await.unwrap());

        gate.acquire(key).await.unwrap();
        clock.advance(TimeDelta::days(3));
        assert!(!gate.is_due(key).await.unwrap());

        gate.release(key).await.unwrap();
        let state = gate.state(key).await.unwrap().unwrap();
        assert_eq!(state.last_run_at, clock.now());
        assert!(!gate.is_due(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_skips_when_not_due() {
        let (gate, _) = gate_at(noon());
        let key = RefreshKey::FacilityImport;
        assert!(matches!(
            gate.run(key, None, async { 1 }).await.unwrap(),
            GateOutcome::Ran(1)
        ));
        assert!(matches!(
            gate.run(key, None, async { 2 }).await.unwrap(),
            GateOutcome::NotDue
        ));
    }

    #[tokio::test]
    async fn test_run_past_ceiling_leaves_lock_held() {
        let (gate, clock) = gate_at(noon());
        let key = RefreshKey::FacilityImport;
        let outcome = gate
            .run(key, Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
            .unwrap();
        assert!(matches!(outcome, GateOutcome::TimedOut));

        clock.advance(TimeDelta::days(10));
        assert!(gate.state(key).await.unwrap().unwrap().locked);
        assert!(!gate.is_due(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_keeps_last_run() {
        let (gate, clock) = gate_at(noon());
        let key = RefreshKey::Services;
        gate.release(key).await.unwrap();
        gate.acquire(key).await.unwrap();
        clock.advance(TimeDelta::hours(1));

        gate.unlock(key).await.unwrap();
        let state = gate.state(key).await.unwrap().unwrap();
        assert!(!state.locked);
        assert_eq!(state.last_run_at, noon());
        assert!(!gate.is_due(key).await.unwrap());
    }

    #[test]
    fn test_keys_serialize_as_persisted_names() {
        for key in RefreshKey::ALL {
            assert_eq!(
                serde_json::to_value(key).unwrap(),
                serde_json::Value::String(key.as_str().to_string())
            );
        }
    }
}
