//! Projects the facility feed into facility entities.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info, instrument, trace};

use crate::store::{EntityStatus, EntityStore, Taxonomy, TermId, TermStore};
use crate::sync::normalize::{
    FacilityInsurance, FacilityRecord, FacilityServices, Facilities, InsurancePlans, Services,
    Snapshot,
};
use crate::sync::terms::{county_slug, slugify};
use crate::utils::log_if_slow;

const SLOW_UPSERT_THRESHOLD: Duration = Duration::from_millis(500);

/// Scalar fields copied from a facility record onto its entity.
pub const FACILITY_FIELDS: &[&str] = &[
    "FacilityID",
    "FacilityName",
    "Active",
    "Address",
    "Address2",
    "City",
    "State",
    "County",
    "Zip",
    "Phone",
    "Fax1",
    "Fax2",
    "Fax3",
    "NPI",
    "MedicaidID",
    "MedicareID",
    "TaxID",
    "CorpID",
    "StateCorp",
    "StateID",
    "CLIANumber",
    "NumBeds",
    "CreatedBy",
    "CreatedDate",
    "LastModifiedBy",
    "LastModifiedDate",
    "LegalName",
];

/// The collections an import reads.
#[derive(Debug, Clone, Copy)]
pub struct ImportFeed<'a> {
    pub facilities: &'a Facilities,
    pub services: &'a Services,
    pub plans: &'a InsurancePlans,
    pub facility_insurance: &'a FacilityInsurance,
    pub facility_services: &'a FacilityServices,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Entities that were published before the run began.
    pub demoted: u64,
    pub created: usize,
    pub updated: usize,
    pub published: usize,
    pub drafted: usize,
    pub failed: usize,
}

struct Upserted {
    created: bool,
    status: EntityStatus,
}

/// Demote every entity, then upsert one entity per feed facility.
///
/// Facilities missing from the feed stay drafts. A facility that fails is
/// logged and counted; the rest of the batch still runs.
#[instrument(skip_all, fields(facilities = feed.facilities.len()))]
pub async fn import_facilities(
    terms: &dyn TermStore,
    entities: &dyn EntityStore,
    feed: ImportFeed<'_>,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        demoted: entities.demote_all().await?,
        ..ImportReport::default()
    };

    for (facility_id, record) in feed.facilities.iter() {
        let start = Instant::now();
        let result = upsert_facility(terms, entities, &feed, facility_id, record).await;
        log_if_slow(start, SLOW_UPSERT_THRESHOLD, "facility upsert");

        match result {
            Ok(upserted) => {
                if upserted.created {
                    report.created += 1;
                } else {
                    report.updated += 1;
                }
                match upserted.status {
                    EntityStatus::Published => report.published += 1,
                    EntityStatus::Draft => report.drafted += 1,
                }
            }
            Err(e) => {
                error!(facility_id, error = ?e, "Failed to import facility");
                report.failed += 1;
            }
        }
    }

    info!(
        demoted = report.demoted,
        created = report.created,
        updated = report.updated,
        published = report.published,
        drafted = report.drafted,
        failed = report.failed,
        "Facility import finished"
    );
    Ok(report)
}

async fn upsert_facility(
    terms: &dyn TermStore,
    entities: &dyn EntityStore,
    feed: &ImportFeed<'_>,
    facility_id: i64,
    record: &FacilityRecord,
) -> Result<Upserted> {
    let status = if record.is_active() {
        EntityStatus::Published
    } else {
        EntityStatus::Draft
    };
    let title = record.name();

    let (id, created) = match entities.find_by_facility_id(facility_id).await? {
        Some(id) => {
            entities.update_entity(id, title.as_deref(), status).await?;
            (id, false)
        }
        None => {
            let title = title.unwrap_or_default();
            (entities.insert_entity(facility_id, &title, status).await?, true)
        }
    };

    let values: Vec<(&str, String)> = FACILITY_FIELDS
        .iter()
        .filter_map(|field| record.text(field).map(|value| (*field, value)))
        .collect();
    let fields: Vec<(&str, &str)> = values.iter().map(|(k, v)| (*k, v.as_str())).collect();
    entities.write_fields(id, &fields).await?;

    let geography = geography_terms(terms, record).await?;
    entities
        .replace_tags(id, Taxonomy::County, &geography)
        .await?;

    let plan_names = feed
        .facility_insurance
        .linked(facility_id)
        .filter_map(|ins_id| feed.plans.name(ins_id));
    let insurance = resolve_terms(terms, Taxonomy::Insurance, plan_names).await?;
    if !insurance.is_empty() {
        entities
            .replace_tags(id, Taxonomy::Insurance, &insurance)
            .await?;
    }

    let service_names = feed
        .facility_services
        .linked(facility_id)
        .filter_map(|service_id| feed.services.name(service_id));
    let services = resolve_terms(terms, Taxonomy::Service, service_names).await?;
    if !services.is_empty() {
        entities
            .replace_tags(id, Taxonomy::Service, &services)
            .await?;
    }

    Ok(Upserted { created, status })
}

async fn geography_terms(terms: &dyn TermStore, record: &FacilityRecord) -> Result<Vec<TermId>> {
    let mut slugs = Vec::new();
    if let Some(state) = record.state() {
        slugs.push(slugify(&state));
        if let Some(county) = record.county() {
            slugs.push(county_slug(&state, &county));
        }
    }
    resolve_slugs(terms, Taxonomy::County, slugs).await
}

async fn resolve_terms<'n>(
    terms: &dyn TermStore,
    taxonomy: Taxonomy,
    names: impl Iterator<Item = &'n str>,
) -> Result<Vec<TermId>> {
    let slugs: Vec<String> = names.map(slugify).collect();
    resolve_slugs(terms, taxonomy, slugs).await
}

/// Term ids for the slugs that exist, deduplicated. Misses are dropped.
async fn resolve_slugs(
    terms: &dyn TermStore,
    taxonomy: Taxonomy,
    slugs: Vec<String>,
) -> Result<Vec<TermId>> {
    let mut ids = BTreeSet::new();
    for slug in slugs.into_iter().filter(|s| !s.is_empty()) {
        match terms.find_term(taxonomy, &slug).await? {
            Some(term) => {
                ids.insert(term.id);
            }
            None => trace!(taxonomy = %taxonomy, slug = %slug, "No term for slug"),
        }
    }
    Ok(ids.into_iter().collect())
}
