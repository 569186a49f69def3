use axum::extract::{Path, State};
use axum::response::Response;

use crate::state::AppState;
use crate::store::Taxonomy;
use crate::web::error::{ApiError, ApiErrorCode, store_error};
use crate::web::routes::{cache, with_cache_control};

/// `GET /api/terms/{taxonomy}` -- every term of a taxonomy, by name.
pub(super) async fn list_terms(
    State(state): State<AppState>,
    Path(taxonomy): Path<String>,
) -> Result<Response, ApiError> {
    let taxonomy: Taxonomy = taxonomy.parse().map_err(|_| {
        ApiError::new(
            ApiErrorCode::UnknownTaxonomy,
            format!("unknown taxonomy '{taxonomy}'"),
        )
    })?;

    let terms = state
        .stores
        .terms
        .list_terms(taxonomy)
        .await
        .map_err(|e| store_error(&format!("Term listing for {taxonomy}"), e))?;

    Ok(with_cache_control(terms, cache::PUBLIC))
}
