use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, Caller, LeaveQrDto, LeaveStartQuery};
use crate::services::LeaveStart;

pub async fn issue_leave_qr(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LeaveQrDto>>, ApiError> {
    let base = state.base_url(&headers);
    let issued = state.leave_service().issue(company_id, &base).await?;

    Ok(Json(ApiResponse::success(LeaveQrDto::from(&issued))))
}

pub async fn start_leave(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(query): Query<LeaveStartQuery>,
) -> Result<Json<ApiResponse<LeaveStart>>, ApiError> {
    let started = state
        .leave_service()
        .start(query.company_id, query.qr_id, &query.token, &caller)
        .await?;

    Ok(Json(ApiResponse::success(started)))
}

pub async fn consume_leave_qr(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path((company_id, qr_id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .leave_service()
        .consume(company_id, qr_id, &caller)
        .await?;

    Ok(Json(ApiResponse::success(())))
}
