//! Domain primitives shared by the QR check-in services.
//!
//! Holds the caller identity asserted by the identity provider, the scan
//! direction, and the canonical UTC instant format used on the wire.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the authenticated caller, as asserted by the upstream
/// identity provider.
///
/// `company_id` is the optional company-context assertion. When present it
/// must match the company that owns the scanned QR record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    pub company_id: Option<i32>,
}

impl CallerIdentity {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            company_id: None,
        }
    }

    #[must_use]
    pub const fn with_company(mut self, company_id: i32) -> Self {
        self.company_id = Some(company_id);
        self
    }
}

/// Which attendance transition a scan requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    #[default]
    CheckIn,
    CheckOut,
}

impl ScanDirection {
    #[must_use]
    pub const fn is_checkout(&self) -> bool {
        matches!(self, Self::CheckOut)
    }

    /// Parses the `mode` query value used by the image endpoints (`in`/`out`).
    /// Anything other than `out` means check-in.
    #[must_use]
    pub fn from_mode(mode: &str) -> Self {
        if mode.eq_ignore_ascii_case("out") {
            Self::CheckOut
        } else {
            Self::CheckIn
        }
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckIn => write!(f, "checkin"),
            Self::CheckOut => write!(f, "checkout"),
        }
    }
}

/// Formats an instant as ISO-8601 UTC with microsecond precision and a `Z`
/// suffix. Strings in this format sort in chronological order.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an ISO-8601 instant. Values without an offset are taken as UTC.
#[must_use]
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn instant_round_trips_through_wire_format() {
        let instant = Utc.with_ymd_and_hms(2025, 11, 1, 8, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let text = format_instant(instant);
        assert_eq!(text, "2025-11-01T08:30:00.123456Z");
        assert_eq!(parse_instant(&text), Some(instant));
    }

    #[test]
    fn parse_accepts_offsets_and_naive_values() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 1, 6, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-11-01T08:00:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2025-11-01T06:00:00"), Some(expected));
        assert_eq!(parse_instant("2025-11-01T06:00:00.0000000Z"), Some(expected));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_instant("yesterday"), None);
        assert_eq!(parse_instant(""), None);
    }

    #[test]
    fn direction_from_mode() {
        assert_eq!(ScanDirection::from_mode("out"), ScanDirection::CheckOut);
        assert_eq!(ScanDirection::from_mode("OUT"), ScanDirection::CheckOut);
        assert_eq!(ScanDirection::from_mode("in"), ScanDirection::CheckIn);
        assert_eq!(ScanDirection::from_mode("anything"), ScanDirection::CheckIn);
        assert!(ScanDirection::CheckOut.is_checkout());
    }

    #[test]
    fn caller_identity_builder() {
        let caller = CallerIdentity::new("user-1").with_company(5);
        assert_eq!(caller.user_id, "user-1");
        assert_eq!(caller.company_id, Some(5));
    }
}
