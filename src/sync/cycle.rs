//! One refresh cycle: terms, collection pre-warm, then the facility import.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument};

use crate::directory::{Collection, Directory};
use crate::store::Stores;
use crate::sync::cache::CollectionCache;
use crate::sync::clock::Clock;
use crate::sync::gate::{GateOutcome, RefreshKey, StalenessGate};
use crate::sync::import::{ImportFeed, ImportReport, import_facilities};
use crate::sync::normalize::{
    FacilityInsurance, FacilityServices, Facilities, InsurancePlans, Services, Snapshot,
};
use crate::sync::terms::{TermSyncReport, sync_terms};

/// Default execution ceiling of the facility import.
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(600);

/// What a cycle actually did. `None` means the step was not due.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub terms: Option<TermSyncReport>,
    pub import: Option<ImportReport>,
    pub import_timed_out: bool,
}

/// The importer wired to a directory and a set of stores.
pub struct Pipeline {
    directory: Arc<dyn Directory>,
    stores: Stores,
    gate: StalenessGate,
    cache: CollectionCache,
    import_timeout: Duration,
}

impl Pipeline {
    pub fn new(directory: Arc<dyn Directory>, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let gate = StalenessGate::new(stores.state.clone(), clock);
        let cache = CollectionCache::new(stores.state.clone());
        Self {
            directory,
            stores,
            gate,
            cache,
            import_timeout: DEFAULT_IMPORT_TIMEOUT,
        }
    }

    pub fn with_import_timeout(mut self, import_timeout: Duration) -> Self {
        self.import_timeout = import_timeout;
        self
    }

    pub fn gate(&self) -> &StalenessGate {
        &self.gate
    }

    pub fn cache(&self) -> &CollectionCache {
        &self.cache
    }

    /// Gated refresh of a single collection.
    pub async fn refresh<S: Snapshot>(&self) -> Result<S> {
        self.cache.refresh(&self.gate, self.directory.as_ref()).await
    }

    /// Run every gated step in order. Steps that are not due are skipped.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let terms = self.register_custom_terms().await?;
        self.update_data().await?;
        let (import, import_timed_out) = match self.import_facilities().await? {
            GateOutcome::Ran(report) => (report, false),
            GateOutcome::TimedOut => (None, true),
            GateOutcome::NotDue => (None, false),
        };

        let report = CycleReport {
            terms,
            import,
            import_timed_out,
        };
        debug!(?report, "Refresh cycle finished");
        Ok(report)
    }

    /// Rebuild insurance, service and geography terms when due.
    #[instrument(skip_all)]
    pub async fn register_custom_terms(&self) -> Result<Option<TermSyncReport>> {
        let outcome = self
            .gate
            .run(RefreshKey::CustomTerms, None, async {
                let services = self.refresh::<Services>().await?;
                let plans = self.refresh::<InsurancePlans>().await?;
                let facilities = self.refresh::<Facilities>().await?;
                sync_terms(self.stores.terms.as_ref(), &services, &plans, &facilities).await
            })
            .await?;

        match outcome {
            GateOutcome::Ran(Ok(report)) => Ok(Some(report)),
            GateOutcome::Ran(Err(e)) => {
                error!(error = ?e, "Term synchronization failed");
                Ok(None)
            }
            GateOutcome::NotDue | GateOutcome::TimedOut => Ok(None),
        }
    }

    /// Give every collection its chance to refresh.
    #[instrument(skip_all)]
    pub async fn update_data(&self) -> Result<()> {
        self.refresh::<Facilities>().await?;
        self.refresh::<Services>().await?;
        self.refresh::<InsurancePlans>().await?;
        self.refresh::<FacilityInsurance>().await?;
        self.refresh::<FacilityServices>().await?;
        Ok(())
    }

    /// Reconcile facility entities against the feed when due.
    ///
    /// Skipped without touching the gate while no facility transport is
    /// configured, so an unconfigured service never demotes everything.
    #[instrument(skip_all)]
    pub async fn import_facilities(&self) -> Result<GateOutcome<Option<ImportReport>>> {
        if !self.directory.is_configured(Collection::Facilities) {
            debug!("Facility collection not configured, import skipped");
            return Ok(GateOutcome::NotDue);
        }

        let outcome = self
            .gate
            .run(
                RefreshKey::FacilityImport,
                Some(self.import_timeout),
                async {
                    let facilities = self.refresh::<Facilities>().await?;
                    let services = self.refresh::<Services>().await?;
                    let plans = self.refresh::<InsurancePlans>().await?;
                    let facility_insurance = self.refresh::<FacilityInsurance>().await?;
                    let facility_services = self.refresh::<FacilityServices>().await?;

                    import_facilities(
                        self.stores.terms.as_ref(),
                        self.stores.entities.as_ref(),
                        ImportFeed {
                            facilities: &facilities,
                            services: &services,
                            plans: &plans,
                            facility_insurance: &facility_insurance,
                            facility_services: &facility_services,
                        },
                    )
                    .await
                },
            )
            .await?;

        Ok(match outcome {
            GateOutcome::Ran(Ok(report)) => GateOutcome::Ran(Some(report)),
            GateOutcome::Ran(Err(e)) => {
                error!(error = ?e, "Facility import failed");
                GateOutcome::Ran(None)
            }
            GateOutcome::TimedOut => {
                info!(ceiling = ?self.import_timeout, "Facility import abandoned");
                GateOutcome::TimedOut
            }
            GateOutcome::NotDue => GateOutcome::NotDue,
        })
    }
}
