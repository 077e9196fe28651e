use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::Duration;
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState, Caller, ImageQuery, LiveTokenDto, QrRecordDto,
    ValidityQuery, VerifyRequest,
};
use crate::constants::routes;
use crate::domain::{ScanDirection, format_instant};
use crate::models::qr::QrRecord;
use crate::services::{QrError, VerifiedCheckIn};

fn png_response(png: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
}

/// Live tokens and images are only produced for active, unexpired records.
fn require_live(record: QrRecord) -> Result<QrRecord, ApiError> {
    if record.is_valid_at(chrono::Utc::now()) {
        Ok(record)
    } else {
        Err(QrError::QrNotFound(record.id).into())
    }
}

pub async fn ensure_qr(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
    Query(query): Query<ValidityQuery>,
) -> Result<Json<ApiResponse<QrRecordDto>>, ApiError> {
    let valid_for = query.valid_minutes.map(Duration::minutes);
    let record = state
        .qr_service()
        .ensure(company_id, valid_for, query.force)
        .await?;

    Ok(Json(ApiResponse::success(QrRecordDto::from(&record))))
}

pub async fn create_qr(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
    Query(query): Query<ValidityQuery>,
) -> Result<Json<ApiResponse<QrRecordDto>>, ApiError> {
    let valid_for = query
        .valid_minutes
        .map_or_else(Duration::zero, Duration::minutes);

    let record = state.qr_service().create(company_id, valid_for).await?;

    Ok(Json(ApiResponse::success(QrRecordDto::from(&record))))
}

pub async fn list_company_qr(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<QrRecordDto>>>, ApiError> {
    let records = state.qr_service().list_for_company(company_id).await?;

    Ok(Json(ApiResponse::success(
        records.iter().map(QrRecordDto::from).collect(),
    )))
}

pub async fn deactivate_qr(
    State(state): State<Arc<AppState>>,
    Path((company_id, id)): Path<(i32, i32)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.qr_service().deactivate(company_id, id).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn live_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<LiveTokenDto>>, ApiError> {
    let record = require_live(state.qr_service().get(id).await?)?;
    let token = state.qr_service().live_token(&record)?;

    Ok(Json(ApiResponse::success(LiveTokenDto {
        qr_id: record.id,
        token,
        expiry_date: format_instant(record.expiry_date),
    })))
}

pub async fn token_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record = require_live(state.qr_service().get(id).await?)?;
    let png = state
        .qr_service()
        .render_image(&record, None, query.pixels_per_module)?;

    Ok(png_response(png))
}

pub async fn company_qr_image(
    State(state): State<Arc<AppState>>,
    Path((company_id, id)): Path<(i32, i32)>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.qr_service().get(id).await?;
    if record.company_id != company_id {
        return Err(QrError::QrNotFound(id).into());
    }
    let record = require_live(record)?;

    let direction = query
        .mode
        .as_deref()
        .map_or(ScanDirection::CheckIn, ScanDirection::from_mode);
    let scan_path = if direction.is_checkout() {
        routes::SCAN_CHECK_OUT
    } else {
        routes::SCAN_CHECK_IN
    };
    let base = format!("{}{scan_path}", state.base_url(&headers));

    let png = state
        .qr_service()
        .render_image(&record, Some(&base), query.pixels_per_module)?;

    Ok(png_response(png))
}

pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<ApiResponse<VerifiedCheckIn>>, ApiError> {
    let verified = state
        .scan_service()
        .verify_programmatic(&request.token_string, &caller)
        .await?;

    Ok(Json(ApiResponse::success(verified)))
}
