//! Public facility listing and the geocoder write-back.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, State};
use axum::response::{Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use ts_rs::TS;

use crate::store::{EntityStatus, FacilityEntity, Taxonomy, TermId};
use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode, store_error};
use crate::web::routes::{cache, with_cache_control};

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FacilityResponse {
    #[ts(type = "number")]
    pub facility_id: i64,
    pub title: String,
    pub fields: BTreeMap<String, String>,
    pub counties: Vec<String>,
    pub insurance: Vec<String>,
    pub services: Vec<String>,
}

fn term_names(
    entity: &FacilityEntity,
    taxonomy: Taxonomy,
    names: &HashMap<TermId, String>,
) -> Vec<String> {
    entity
        .tags(taxonomy)
        .iter()
        .filter_map(|id| names.get(id).cloned())
        .collect()
}

/// `GET /api/facilities` -- published facilities with their tag names.
#[instrument(skip_all)]
pub(super) async fn list_facilities(State(state): State<AppState>) -> Result<Response, ApiError> {
    let entities = state
        .stores
        .entities
        .list_entities(Some(EntityStatus::Published))
        .await
        .map_err(|e| store_error("Facility listing", e))?;

    let mut names: HashMap<TermId, String> = HashMap::new();
    for taxonomy in Taxonomy::ALL {
        let terms = state
            .stores
            .terms
            .list_terms(taxonomy)
            .await
            .map_err(|e| store_error("Term listing", e))?;
        names.extend(terms.into_iter().map(|t| (t.id, t.name)));
    }

    let mut facilities: Vec<FacilityResponse> = entities
        .iter()
        .map(|entity| FacilityResponse {
            facility_id: entity.facility_id,
            title: entity.title.clone(),
            fields: entity.fields.clone(),
            counties: term_names(entity, Taxonomy::County, &names),
            insurance: term_names(entity, Taxonomy::Insurance, &names),
            services: term_names(entity, Taxonomy::Service, &names),
        })
        .collect();
    facilities.sort_by(|a, b| a.title.cmp(&b.title).then(a.facility_id.cmp(&b.facility_id)));

    Ok(with_cache_control(facilities, cache::PUBLIC))
}

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// `POST /api/facilities/{facility_id}/coordinates` -- store a geocoded position.
#[instrument(skip(state, coords))]
pub(super) async fn update_coordinates(
    State(state): State<AppState>,
    Path(facility_id): Path<i64>,
    Json(coords): Json<Coordinates>,
) -> Result<Json<Coordinates>, ApiError> {
    if !coords.is_valid() {
        return Err(ApiError::new(
            ApiErrorCode::InvalidCoordinates,
            format!("coordinates ({}, {}) are out of range", coords.lat, coords.lng),
        ));
    }

    let entities = &state.stores.entities;
    let id = entities
        .find_by_facility_id(facility_id)
        .await
        .map_err(|e| store_error("Facility lookup", e))?
        .ok_or_else(|| ApiError::not_found(format!("facility {facility_id} not found")))?;

    let lat = coords.lat.to_string();
    let lng = coords.lng.to_string();
    entities
        .write_fields(id, &[("Latitude", lat.as_str()), ("Longitude", lng.as_str())])
        .await
        .map_err(|e| store_error("Coordinate update", e))?;

    debug!(lat = coords.lat, lng = coords.lng, "Coordinates stored");
    Ok(Json(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_ranges() {
        let ok = |lat, lng| Coordinates { lat, lng }.is_valid();
        assert!(ok(39.96, -82.99));
        assert!(ok(-90.0, 180.0));
        assert!(!ok(90.5, 0.0));
        assert!(!ok(0.0, -180.1));
        assert!(!ok(f64::NAN, 0.0));
    }
}
