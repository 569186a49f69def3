//! Admin API handlers.
//!
//! All endpoints require the [`AdminAccess`] extractor, which checks the
//! bearer token when one is configured.

use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::settings::{DirectorySettings, ValidationError};
use crate::state::AppState;
use crate::sync::RefreshKey;
use crate::web::error::{ApiError, store_error};

/// Proof that the request may use the admin API.
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Ok(AdminAccess);
        };
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(token) if tokens_match(token, expected) => Ok(AdminAccess),
            _ => Err(ApiError::unauthorized()),
        }
    }
}

/// Exact comparison whose running time does not depend on where the tokens differ.
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshStatus {
    pub key: RefreshKey,
    /// `None` until the key has been observed once.
    pub last_run_at: Option<DateTime<Utc>>,
    pub locked: bool,
    pub due: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminStatusResponse {
    pub refresh: Vec<RefreshStatus>,
}

/// `GET /api/admin/status` -- last run and lock flag of every refresh key.
#[instrument(skip_all)]
pub(super) async fn admin_status(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<AdminStatusResponse>, ApiError> {
    let gate = state.gate();
    let states = gate
        .states()
        .await
        .map_err(|e| store_error("Refresh state lookup", e))?;
    let now = gate.now();

    let refresh = RefreshKey::ALL
        .into_iter()
        .map(|key| {
            let state = states.get(&key);
            RefreshStatus {
                key,
                last_run_at: state.map(|s| s.last_run_at),
                locked: state.is_some_and(|s| s.locked),
                due: state.is_none_or(|s| s.is_due(now)),
            }
        })
        .collect();

    Ok(Json(AdminStatusResponse { refresh }))
}

/// `GET /api/admin/settings`
pub(super) async fn get_settings(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<DirectorySettings>, ApiError> {
    let settings = DirectorySettings::load(state.stores.state.as_ref())
        .await
        .map_err(|e| store_error("Settings lookup", e))?
        .unwrap_or_default();
    Ok(Json(settings))
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SettingsResponse {
    pub settings: DirectorySettings,
    pub errors: Vec<ValidationError>,
}

/// `PUT /api/admin/settings` -- sanitize and store; invalid fields are reported, not rejected.
#[instrument(skip_all)]
pub(super) async fn put_settings(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Json(input): Json<DirectorySettings>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let (settings, errors) = input.sanitize();
    settings
        .save(state.stores.state.as_ref())
        .await
        .map_err(|e| store_error("Settings update", e))?;
    info!(invalid = errors.len(), "Directory settings updated");
    Ok(Json(SettingsResponse { settings, errors }))
}

/// `POST /api/admin/sync` -- wake the scheduler; the gates still decide what runs.
pub(super) async fn trigger_sync(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.sync_notify.notify_one();
    info!("Refresh cycle requested");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "scheduled" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match_exactly() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret ", "s3cret"));
        assert!(!tokens_match(" s3cret", "s3cret"));
        assert!(!tokens_match("s3creT", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }
}
