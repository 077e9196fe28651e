use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{LeaveError, QrError, ScanError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    InternalError(String),

    Unauthorized(String),

    Unavailable(String),

    Qr(QrError),

    Scan(ScanError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Unavailable(msg) => write!(f, "Unavailable: {msg}"),
            Self::Qr(e) => write!(f, "{e}"),
            Self::Scan(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// HTTP status for a verification rejection.
#[must_use]
pub const fn scan_status(err: &ScanError) -> StatusCode {
    match err {
        ScanError::BadFormat | ScanError::BadEncoding | ScanError::MalformedPayload => {
            StatusCode::BAD_REQUEST
        }
        ScanError::InvalidSignature
        | ScanError::TokenExpired
        | ScanError::LiveTimestampOutOfRange
        | ScanError::RecordInactiveOrMissing
        | ScanError::TokenMismatch
        | ScanError::RecordExpired
        | ScanError::ReplayDetected => StatusCode::UNAUTHORIZED,
        ScanError::CompanyMismatch | ScanError::EmployeeNotRecognized => StatusCode::FORBIDDEN,
        ScanError::AlreadyCheckedIn | ScanError::NoOpenSession => StatusCode::CONFLICT,
        ScanError::Database(_) | ScanError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[must_use]
pub const fn qr_status(err: &QrError) -> StatusCode {
    match err {
        QrError::CompanyNotFound(_) | QrError::QrNotFound(_) => StatusCode::NOT_FOUND,
        QrError::CompanyInactive(_) => StatusCode::BAD_REQUEST,
        QrError::Database(_) | QrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "not_found"),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                    "database_error",
                )
            }
            Self::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "validation_error")
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    "internal_error",
                )
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), "unauthorized"),
            Self::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), "unavailable")
            }
            Self::Qr(e) => {
                let status = qr_status(e);
                let message = if status.is_server_error() {
                    tracing::error!(code = e.code(), "QR lifecycle error: {}", e);
                    "An internal error occurred".to_string()
                } else {
                    e.to_string()
                };
                (status, message, e.code())
            }
            Self::Scan(e) => {
                let status = scan_status(e);
                let message = if e.is_infrastructure() {
                    tracing::error!(code = e.code(), "Verification error: {}", e);
                    "An internal error occurred".to_string()
                } else {
                    e.to_string()
                };
                (status, message, e.code())
            }
        };

        let body = ApiResponse::<()>::error(error_message, code);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<QrError> for ApiError {
    fn from(err: QrError) -> Self {
        Self::Qr(err)
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        Self::Scan(err)
    }
}

impl From<LeaveError> for ApiError {
    fn from(err: LeaveError) -> Self {
        match err {
            LeaveError::Qr(e) => Self::Qr(e),
            LeaveError::Scan(e) => Self::Scan(e),
        }
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{resource} {id} not found"))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_rejections_map_to_statuses() {
        assert_eq!(scan_status(&ScanError::BadFormat), StatusCode::BAD_REQUEST);
        assert_eq!(scan_status(&ScanError::MalformedPayload), StatusCode::BAD_REQUEST);
        assert_eq!(scan_status(&ScanError::ReplayDetected), StatusCode::UNAUTHORIZED);
        assert_eq!(
            scan_status(&ScanError::LiveTimestampOutOfRange),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(scan_status(&ScanError::CompanyMismatch), StatusCode::FORBIDDEN);
        assert_eq!(scan_status(&ScanError::NoOpenSession), StatusCode::CONFLICT);
        assert_eq!(
            scan_status(&ScanError::Database(String::new())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn qr_errors_map_to_statuses() {
        assert_eq!(qr_status(&QrError::CompanyNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(qr_status(&QrError::QrNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(qr_status(&QrError::CompanyInactive(1)), StatusCode::BAD_REQUEST);
    }
}
