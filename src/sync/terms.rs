//! Reconciles reference collections into taxonomy terms.

use anyhow::Result;
use tracing::{debug, info, instrument, trace};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::store::{NewTerm, Taxonomy, TermId, TermStore};
use crate::sync::normalize::{Facilities, InsurancePlans, Services, unescape};

/// URL-safe slug of a (possibly entity-escaped) display name.
///
/// Accents are folded to their base letter, runs of anything that is not a
/// letter or digit become a single `-`, and the result is lowercase.
pub fn slugify(name: &str) -> String {
    let decoded = unescape(name);
    let mut slug = String::with_capacity(decoded.len());
    let mut pending_dash = false;

    for c in decoded.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug of the `State-County` child term.
pub fn county_slug(state: &str, county: &str) -> String {
    slugify(&county_name(state, county))
}

fn county_name(state: &str, county: &str) -> String {
    format!("{state}-{county}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSyncReport {
    pub created: usize,
    pub existing: usize,
    /// Taxonomies skipped because they are not registered.
    pub skipped: Vec<Taxonomy>,
}

/// Ensure a term exists for every insurance plan, service and geography.
///
/// Idempotent: terms are matched by slug and never duplicated.
#[instrument(skip_all)]
pub async fn sync_terms(
    store: &dyn TermStore,
    services: &Services,
    plans: &InsurancePlans,
    facilities: &Facilities,
) -> Result<TermSyncReport> {
    let mut sync = TermSync {
        store,
        report: TermSyncReport::default(),
    };

    if sync.registered(Taxonomy::Insurance).await? {
        for (id, name) in plans.iter() {
            sync.ensure(Taxonomy::Insurance, name, format!("InsID: {id}"), None)
                .await?;
        }
    }

    if sync.registered(Taxonomy::Service).await? {
        for (id, name) in services.iter() {
            sync.ensure(Taxonomy::Service, name, format!("ServiceID: {id}"), None)
                .await?;
        }
    }

    if sync.registered(Taxonomy::County).await? {
        for (_, facility) in facilities.iter() {
            let Some(state) = facility.state() else {
                continue;
            };
            let Some(state_id) = sync.ensure(Taxonomy::County, &state, String::new(), None).await?
            else {
                continue;
            };
            if let Some(county) = facility.county() {
                sync.ensure(
                    Taxonomy::County,
                    &county_name(&state, &county),
                    String::new(),
                    Some(state_id),
                )
                .await?;
            }
        }
    }

    let report = sync.report;
    info!(
        created = report.created,
        existing = report.existing,
        skipped = ?report.skipped,
        "Terms synchronized"
    );
    Ok(report)
}

struct TermSync<'a> {
    store: &'a dyn TermStore,
    report: TermSyncReport,
}

impl TermSync<'_> {
    async fn registered(&mut self, taxonomy: Taxonomy) -> Result<bool> {
        let registered = self.store.is_registered(taxonomy).await?;
        if !registered {
            debug!(taxonomy = %taxonomy, "Taxonomy not registered, skipping");
            self.report.skipped.push(taxonomy);
        }
        Ok(registered)
    }

    /// Find or create a term; `None` when the name yields no slug.
    async fn ensure(
        &mut self,
        taxonomy: Taxonomy,
        name: &str,
        description: String,
        parent: Option<TermId>,
    ) -> Result<Option<TermId>> {
        let slug = slugify(name);
        if slug.is_empty() {
            trace!(taxonomy = %taxonomy, name, "Name has no slug, skipping");
            return Ok(None);
        }

        if let Some(existing) = self.store.find_term(taxonomy, &slug).await? {
            self.report.existing += 1;
            return Ok(Some(existing.id));
        }

        let id = self
            .store
            .insert_term(
                taxonomy,
                NewTerm {
                    name: unescape(name),
                    slug,
                    description,
                    parent,
                },
            )
            .await?;
        self.report.created += 1;
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("OH"), "oh");
        assert_eq!(slugify("OH-Franklin"), "oh-franklin");
        assert_eq!(slugify("NC-New Hanover"), "nc-new-hanover");
        assert_eq!(slugify("  Blue Cross / Blue Shield  "), "blue-cross-blue-shield");
        assert_eq!(slugify("Smith &amp; Sons"), "smith-sons");
        assert_eq!(slugify("Caf\u{e9} M\u{e9}dico"), "cafe-medico");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_slugify_is_stable() {
        for name in ["OH-Franklin", "Aetna Better Health", "Caf&eacute;"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn test_county_slug_joins_state_and_county() {
        assert_eq!(county_slug("OH", "Franklin"), "oh-franklin");
    }
}
