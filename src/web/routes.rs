//! Web API router construction and shared response utilities.

use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::web::{admin, facilities, status, terms};

/// Cache-Control presets.
pub mod cache {
    /// Facility and term listings; they change at most once per refresh cycle.
    pub const PUBLIC: &str = "public, max-age=300, stale-while-revalidate=300";
    /// Admin endpoints -- never cache.
    pub const ADMIN: &str = "private, no-store, must-revalidate";
}

/// Wraps a JSON response with a `Cache-Control` header.
pub fn with_cache_control<T: serde::Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/facilities", get(facilities::list_facilities))
        .route(
            "/facilities/{facility_id}/coordinates",
            post(facilities::update_coordinates),
        )
        .route("/terms/{taxonomy}", get(terms::list_terms))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/admin/status", get(admin::admin_status))
        .route(
            "/admin/settings",
            get(admin::get_settings).put(admin::put_settings),
        )
        .route("/admin/sync", post(admin::trigger_sync))
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut().insert(
                    axum::http::header::CACHE_CONTROL,
                    HeaderValue::from_static(cache::ADMIN),
                );
                resp
            },
        ))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router.merge(admin_router))
        .layer((
            TraceLayer::new_for_http(),
            CorsLayer::permissive(),
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
}
