//! Domain service for one-time leave-request QR codes.
//!
//! A leave QR opens the leave-request form for an employee of the company
//! and is deactivated once the request is submitted.

use crate::domain::CallerIdentity;
use crate::models::qr::QrRecord;
use crate::services::qr_service::QrError;
use crate::services::scan_service::ScanError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaveError {
    #[error(transparent)]
    Qr(#[from] QrError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl LeaveError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Qr(e) => e.code(),
            Self::Scan(e) => e.code(),
        }
    }
}

impl From<anyhow::Error> for LeaveError {
    fn from(err: anyhow::Error) -> Self {
        Self::Scan(ScanError::Database(err.to_string()))
    }
}

/// Freshly issued leave QR.
#[derive(Debug, Clone)]
pub struct LeaveQr {
    pub record: QrRecord,
    pub start_url: String,
    pub png: Vec<u8>,
}

/// Caller admitted to the leave-request form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaveStart {
    pub employee_id: i32,
    pub company_id: i32,
    pub qr_id: i32,
}

#[async_trait::async_trait]
pub trait LeaveService: Send + Sync {
    /// Creates a short-lived QR for the company and renders its start link.
    /// Supersedes the company's standing QR.
    async fn issue(&self, company_id: i32, base_url: &str) -> Result<LeaveQr, LeaveError>;

    /// Validates a scanned start link for the caller.
    async fn start(
        &self,
        company_id: i32,
        qr_id: i32,
        raw_token: &str,
        caller: &CallerIdentity,
    ) -> Result<LeaveStart, LeaveError>;

    /// Deactivates the QR after the leave request was submitted.
    async fn consume(
        &self,
        company_id: i32,
        qr_id: i32,
        caller: &CallerIdentity,
    ) -> Result<(), LeaveError>;
}

/// Strips what scanner apps tend to append to the token parameter: the
/// value is percent-decoded, cut at the first `/`, `?` or `&`, and trimmed.
#[must_use]
pub fn clean_scanned_token(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
    let cut = decoded
        .find(['/', '?', '&'])
        .map_or(decoded.as_str(), |idx| &decoded[..idx]);
    cut.trim().to_string()
}
