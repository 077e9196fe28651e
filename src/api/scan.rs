//! Camera scan endpoints. Always `200 OK`; rejections are reported in the
//! [`ScanResult`] body.

use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::{AppState, Caller, ScanQuery};
use crate::domain::ScanDirection;
use crate::services::{ScanError, ScanResult};

async fn handle_scan(
    state: &AppState,
    caller: &crate::domain::CallerIdentity,
    query: ScanQuery,
    direction: ScanDirection,
) -> ScanResult {
    match query.data.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(data) => {
            state
                .scan_service()
                .verify_scan(data, caller, direction)
                .await
        }
        None => ScanResult::rejected(&ScanError::BadFormat, direction),
    }
}

pub async fn scan_check_in(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(query): Query<ScanQuery>,
) -> Json<ScanResult> {
    Json(handle_scan(&state, &caller, query, ScanDirection::CheckIn).await)
}

pub async fn scan_check_out(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Query(query): Query<ScanQuery>,
) -> Json<ScanResult> {
    Json(handle_scan(&state, &caller, query, ScanDirection::CheckOut).await)
}
