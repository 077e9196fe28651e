use axum::{
    Router,
    http::{HeaderMap, HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::constants::routes;
use crate::state::SharedState;

mod error;
mod health;
pub mod identity;
mod leave;
mod observability;
mod qr;
mod scan;
mod types;

pub use error::{ApiError, qr_status, scan_status};
pub use identity::Caller;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn qr_service(&self) -> &Arc<dyn crate::services::QrService> {
        &self.shared.qr_service
    }

    #[must_use]
    pub fn scan_service(&self) -> &Arc<dyn crate::services::ScanService> {
        &self.shared.scan_service
    }

    #[must_use]
    pub fn leave_service(&self) -> &Arc<dyn crate::services::LeaveService> {
        &self.shared.leave_service
    }

    /// Base URL for generated links: `server.public_base_url`, else derived
    /// from the request `Host` (and `X-Forwarded-Proto`).
    #[must_use]
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(base) = self
            .config()
            .server
            .public_base_url
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
        {
            return base.trim_end_matches('/').to_string();
        }

        let host = headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .filter(|p| *p == "https" || *p == "http")
            .unwrap_or("http");

        format!("{scheme}://{host}")
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let scan_routes = Router::new()
        .route(routes::SCAN_CHECK_IN, get(scan::scan_check_in))
        .route("/scan/", get(scan::scan_check_in))
        .route(routes::SCAN_CHECK_OUT, get(scan::scan_check_out))
        .route("/scan/checkout/", get(scan::scan_check_out))
        .route("/leave/start", get(leave::start_leave));

    Router::new()
        .nest("/api", api_router())
        .merge(scan_routes)
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(observability::logging_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(
                    observability::security_headers_middleware,
                ))
                .layer(
                    cors_layer
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers(Any),
                ),
        )
}

// Routes sharing a segment position share the parameter name.
fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/qr/verify", post(qr::verify_token))
        .route("/qr/company/{company_id}", get(qr::list_company_qr))
        .route(
            "/qr/company/{company_id}/{id}/deactivate",
            post(qr::deactivate_qr),
        )
        .route("/qr/{id}", post(qr::create_qr))
        .route("/qr/{id}/ensure", post(qr::ensure_qr))
        .route("/qr/{id}/token", get(qr::live_token))
        .route("/qr/{id}/image", get(qr::token_image))
        .route("/qr/{id}/{qr_id}/image", get(qr::company_qr_image))
        .route("/leave/{company_id}/qr", post(leave::issue_leave_qr))
        .route(
            "/leave/{company_id}/{qr_id}/consume",
            post(leave::consume_leave_qr),
        )
}
