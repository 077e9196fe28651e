//! Domain service for verifying scanned live tokens.
//!
//! A scan moves through decode, signature, timestamp, record, replay and
//! authorization checks before any attendance write. Every failed check is
//! terminal and maps to one [`ScanError`] variant. The only side effect
//! before the attendance write is the replay mark.

use crate::domain::{CallerIdentity, ScanDirection};
use crate::qr::{ReplayError, TokenError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

/// Rejection reasons shared by the programmatic and scan entry points.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Token format is invalid")]
    BadFormat,

    #[error("Token encoding is invalid")]
    BadEncoding,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token payload is malformed")]
    MalformedPayload,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token timestamp is outside the allowed window")]
    LiveTimestampOutOfRange,

    #[error("QR code is inactive or does not exist")]
    RecordInactiveOrMissing,

    #[error("QR token does not match")]
    TokenMismatch,

    #[error("QR code has expired")]
    RecordExpired,

    #[error("QR code was already used")]
    ReplayDetected,

    #[error("QR code belongs to another company")]
    CompanyMismatch,

    #[error("Employee not recognized")]
    EmployeeNotRecognized,

    #[error("Already checked in")]
    AlreadyCheckedIn,

    #[error("No open attendance session")]
    NoOpenSession,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadFormat => "bad_format",
            Self::BadEncoding => "bad_encoding",
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload => "malformed_payload",
            Self::TokenExpired => "token_expired",
            Self::LiveTimestampOutOfRange => "live_timestamp_out_of_range",
            Self::RecordInactiveOrMissing => "record_inactive_or_missing",
            Self::TokenMismatch => "token_mismatch",
            Self::RecordExpired => "record_expired",
            Self::ReplayDetected => "replay_detected",
            Self::CompanyMismatch => "company_mismatch",
            Self::EmployeeNotRecognized => "employee_not_recognized",
            Self::AlreadyCheckedIn => "already_checked_in",
            Self::NoOpenSession => "no_open_session",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Infrastructure failures, as opposed to rejections of the token or caller.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }
}

impl From<TokenError> for ScanError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::BadFormat => Self::BadFormat,
            TokenError::BadEncoding => Self::BadEncoding,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::MalformedPayload => Self::MalformedPayload,
        }
    }
}

impl From<ReplayError> for ScanError {
    fn from(err: ReplayError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<sea_orm::DbErr> for ScanError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ScanError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Per-entry-point verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Largest accepted `|now - live|`, inclusive.
    pub max_live_latency: Duration,
    /// Whether the payload `exp` is checked in addition to the record expiry.
    pub enforce_payload_expiry: bool,
    pub replay_ttl: Duration,
}

impl VerifyPolicy {
    /// Programmatic verification: 2-minute window, payload expiry enforced.
    #[must_use]
    pub fn api() -> Self {
        Self {
            max_live_latency: Duration::minutes(2),
            enforce_payload_expiry: true,
            replay_ttl: Duration::minutes(3),
        }
    }

    /// Camera scans: 15-minute window, record expiry only.
    #[must_use]
    pub fn scan() -> Self {
        Self {
            max_live_latency: Duration::minutes(15),
            enforce_payload_expiry: false,
            replay_ttl: Duration::minutes(3),
        }
    }
}

/// Policies for both entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicies {
    pub api: VerifyPolicy,
    pub scan: VerifyPolicy,
}

impl Default for VerifyPolicies {
    fn default() -> Self {
        Self {
            api: VerifyPolicy::api(),
            scan: VerifyPolicy::scan(),
        }
    }
}

impl From<&crate::config::QrConfig> for VerifyPolicies {
    fn from(config: &crate::config::QrConfig) -> Self {
        let replay_ttl = Duration::seconds(i64::from(config.replay_ttl_seconds));
        Self {
            api: VerifyPolicy {
                max_live_latency: Duration::seconds(i64::from(config.api_max_latency_seconds)),
                enforce_payload_expiry: config.enforce_payload_expiry_api,
                replay_ttl,
            },
            scan: VerifyPolicy {
                max_live_latency: Duration::seconds(i64::from(config.scan_max_latency_seconds)),
                enforce_payload_expiry: config.enforce_payload_expiry_scan,
                replay_ttl,
            },
        }
    }
}

/// Latency check on the payload `live` instant. Exactly `window` away is
/// accepted.
pub fn check_live_latency(
    live: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<(), ScanError> {
    if (now - live).abs() > window {
        return Err(ScanError::LiveTimestampOutOfRange);
    }
    Ok(())
}

/// Successful programmatic verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedCheckIn {
    pub employee_id: i32,
    pub company_id: i32,
    pub qr_id: i32,
    /// Absent when the attendance write was skipped or failed.
    pub attendance_id: Option<i32>,
}

/// Outcome of a camera scan, rendered as JSON by the scan endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_id: Option<i32>,
    pub is_checkout: bool,
}

impl ScanResult {
    #[must_use]
    pub fn rejected(err: &ScanError, direction: ScanDirection) -> Self {
        let message = if err.is_infrastructure() {
            "Scan could not be processed".to_string()
        } else {
            err.to_string()
        };

        Self {
            success: false,
            message,
            reason: Some(err.code().to_string()),
            employee_id: None,
            company_id: None,
            attendance_id: None,
            is_checkout: direction.is_checkout(),
        }
    }
}

/// Domain service trait for token verification.
#[async_trait::async_trait]
pub trait ScanService: Send + Sync {
    /// Verifies a token string from an API client and records a check-in.
    ///
    /// Attendance failures after a successful verification are logged and
    /// leave `attendance_id` empty.
    ///
    /// # Errors
    ///
    /// Returns the [`ScanError`] of the first failed check.
    async fn verify_programmatic(
        &self,
        token: &str,
        caller: &CallerIdentity,
    ) -> Result<VerifiedCheckIn, ScanError>;

    /// Verifies raw scan data (percent-encoded token from a scan link) and
    /// applies the requested attendance transition. Never fails: rejections
    /// are part of the result.
    async fn verify_scan(
        &self,
        raw_data: &str,
        caller: &CallerIdentity,
        direction: ScanDirection,
    ) -> ScanResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_boundary_is_inclusive() {
        let now = Utc::now();
        let window = Duration::minutes(2);

        assert!(check_live_latency(now - window, now, window).is_ok());
        assert!(check_live_latency(now + window, now, window).is_ok());
        assert_eq!(
            check_live_latency(now - window - Duration::milliseconds(1), now, window),
            Err(ScanError::LiveTimestampOutOfRange)
        );
        assert_eq!(
            check_live_latency(now + window + Duration::milliseconds(1), now, window),
            Err(ScanError::LiveTimestampOutOfRange)
        );
    }

    #[test]
    fn token_errors_map_one_to_one() {
        assert_eq!(ScanError::from(TokenError::BadFormat), ScanError::BadFormat);
        assert_eq!(ScanError::from(TokenError::BadEncoding), ScanError::BadEncoding);
        assert_eq!(
            ScanError::from(TokenError::InvalidSignature),
            ScanError::InvalidSignature
        );
        assert_eq!(
            ScanError::from(TokenError::MalformedPayload),
            ScanError::MalformedPayload
        );
    }

    #[test]
    fn rejected_result_hides_infrastructure_detail() {
        let result = ScanResult::rejected(
            &ScanError::Database("disk I/O error".into()),
            ScanDirection::CheckOut,
        );
        assert!(!result.success);
        assert!(result.is_checkout);
        assert_eq!(result.reason.as_deref(), Some("database_error"));
        assert!(!result.message.contains("disk"));

        let result = ScanResult::rejected(&ScanError::ReplayDetected, ScanDirection::CheckIn);
        assert_eq!(result.reason.as_deref(), Some("replay_detected"));
        assert_eq!(result.message, "QR code was already used");
    }

    #[test]
    fn default_policies() {
        let policies = VerifyPolicies::default();
        assert_eq!(policies.api.max_live_latency, Duration::seconds(120));
        assert!(policies.api.enforce_payload_expiry);
        assert_eq!(policies.scan.max_live_latency, Duration::seconds(900));
        assert!(!policies.scan.enforce_payload_expiry);
        assert_eq!(policies.scan.replay_ttl, Duration::seconds(180));
    }
}
