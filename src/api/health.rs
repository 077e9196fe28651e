use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, HealthDto};

fn health(state: &AppState, status: &'static str) -> HealthDto {
    HealthDto {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }
}

pub async fn live(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(health(&state, "ok")))
}

pub async fn ready(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthDto>>, ApiError> {
    if let Err(e) = state.store().ping().await {
        tracing::warn!(error = %e, "Readiness check failed");
        return Err(ApiError::Unavailable("Database unavailable".to_string()));
    }

    Ok(Json(ApiResponse::success(health(&state, "ready"))))
}
