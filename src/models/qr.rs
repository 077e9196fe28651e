use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::company_qr_codes;

/// Persisted, company-scoped QR record.
///
/// Deactivated rows are kept for audit and never reactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrRecord {
    pub id: i32,
    pub company_id: i32,
    pub token: String,
    pub generated_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
}

impl QrRecord {
    /// Strictly before `expiry_date` counts as valid.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expiry_date > now
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date < now
    }
}

impl From<company_qr_codes::Model> for QrRecord {
    fn from(model: company_qr_codes::Model) -> Self {
        Self {
            id: model.id,
            company_id: model.company_id,
            token: model.token,
            generated_at: model.generated_at,
            expiry_date: model.expiry_date,
            is_active: model.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expiry_date: DateTime<Utc>, is_active: bool) -> QrRecord {
        QrRecord {
            id: 1,
            company_id: 5,
            token: "abc".to_string(),
            generated_at: expiry_date - Duration::minutes(10),
            expiry_date,
            is_active,
        }
    }

    #[test]
    fn validity_requires_active_and_future_expiry() {
        let now = Utc::now();
        assert!(record(now + Duration::seconds(1), true).is_valid_at(now));
        assert!(!record(now + Duration::seconds(1), false).is_valid_at(now));
        assert!(!record(now, true).is_valid_at(now));
    }

    #[test]
    fn expiry_is_strictly_before_now() {
        let now = Utc::now();
        assert!(!record(now, true).is_expired_at(now));
        assert!(record(now - Duration::milliseconds(1), true).is_expired_at(now));
    }
}
