//! Domain service for the company QR lifecycle.
//!
//! This module provides the [`QrService`] trait: creation under the
//! single-active-per-company invariant, expiry-driven regeneration, listing,
//! manual deactivation, and live token/image production for a record.

use crate::models::qr::QrRecord;
use crate::qr::{RenderError, TokenError};
use chrono::Duration;
use thiserror::Error;

/// Domain errors for QR lifecycle operations.
#[derive(Debug, Error)]
pub enum QrError {
    #[error("Company {0} not found")]
    CompanyNotFound(i32),

    #[error("Company {0} is inactive")]
    CompanyInactive(i32),

    #[error("QR record {0} not found")]
    QrNotFound(i32),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QrError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CompanyNotFound(_) => "company_not_found",
            Self::CompanyInactive(_) => "company_inactive",
            Self::QrNotFound(_) => "qr_not_found",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<sea_orm::DbErr> for QrError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for QrError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<RenderError> for QrError {
    fn from(err: RenderError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<TokenError> for QrError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for QrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for the QR lifecycle.
#[async_trait::async_trait]
pub trait QrService: Send + Sync {
    /// Supersedes every active record of the company with a new one valid
    /// for `valid_for`.
    ///
    /// # Errors
    ///
    /// - Returns [`QrError::CompanyNotFound`] if the company does not exist
    /// - Returns [`QrError::CompanyInactive`] if the company is disabled
    /// - Returns [`QrError::Database`] when the write keeps conflicting
    ///
    /// A non-positive `valid_for` means the standing validity.
    async fn create(&self, company_id: i32, valid_for: Duration) -> Result<QrRecord, QrError>;

    /// Returns the latest active record while it is unexpired, without
    /// writing. Creates a new one otherwise.
    async fn regenerate_if_expired(
        &self,
        company_id: i32,
        valid_for: Duration,
    ) -> Result<QrRecord, QrError>;

    /// Deactivates the latest record (if any) and creates a new one.
    async fn force_regenerate(
        &self,
        company_id: i32,
        valid_for: Duration,
    ) -> Result<QrRecord, QrError>;

    /// `force` selects [`QrService::force_regenerate`], otherwise
    /// [`QrService::regenerate_if_expired`]. `None` or a non-positive
    /// validity means the short-lived default.
    async fn ensure(
        &self,
        company_id: i32,
        valid_for: Option<Duration>,
        force: bool,
    ) -> Result<QrRecord, QrError>;

    /// # Errors
    ///
    /// - Returns [`QrError::QrNotFound`] if no record has this id
    async fn get(&self, id: i32) -> Result<QrRecord, QrError>;

    /// All records of the company, newest first.
    async fn list_for_company(&self, company_id: i32) -> Result<Vec<QrRecord>, QrError>;

    /// Manual deactivation, scoped to the owning company.
    ///
    /// # Errors
    ///
    /// - Returns [`QrError::QrNotFound`] if the record does not belong to the company
    async fn deactivate(&self, company_id: i32, id: i32) -> Result<(), QrError>;

    /// Signed token for the record with `live = now`.
    fn live_token(&self, record: &QrRecord) -> Result<String, QrError>;

    /// PNG of a fresh live token, wrapped into a scan link when `base_url`
    /// is set.
    fn render_image(
        &self,
        record: &QrRecord,
        base_url: Option<&str>,
        pixels_per_module: Option<u32>,
    ) -> Result<Vec<u8>, QrError>;
}

/// Lifecycle tunables, taken from the `[qr]` config section.
#[derive(Debug, Clone)]
pub struct QrSettings {
    pub standing_validity: Duration,
    pub short_validity: Duration,
    pub pixels_per_module: u32,
    pub create_retry_attempts: u32,
    pub create_retry_backoff: std::time::Duration,
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            standing_validity: Duration::days(7),
            short_validity: Duration::minutes(10),
            pixels_per_module: crate::qr::render::DEFAULT_PIXELS_PER_MODULE,
            create_retry_attempts: 5,
            create_retry_backoff: std::time::Duration::from_millis(25),
        }
    }
}

impl From<&crate::config::QrConfig> for QrSettings {
    fn from(config: &crate::config::QrConfig) -> Self {
        Self {
            standing_validity: Duration::days(i64::from(config.standing_validity_days)),
            short_validity: Duration::minutes(i64::from(config.short_validity_minutes)),
            pixels_per_module: config.pixels_per_module,
            create_retry_attempts: config.create_retry_attempts.max(1),
            create_retry_backoff: std::time::Duration::from_millis(config.create_retry_backoff_ms),
        }
    }
}
