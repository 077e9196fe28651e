use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::attendances;

/// Source tag written on QR-originated check-ins.
pub const QR_SCAN_SOURCE: &str = "QRScan";

/// Marker appended to the source tag when a QR scan closes the session.
pub const QR_CHECKOUT_MARKER: &str = "|QRScan-Checkout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceSession {
    pub id: i32,
    pub employee_id: i32,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub source: String,
}

impl AttendanceSession {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }
}

impl From<attendances::Model> for AttendanceSession {
    fn from(model: attendances::Model) -> Self {
        Self {
            id: model.id,
            employee_id: model.employee_id,
            check_in_time: model.check_in_time,
            check_out_time: model.check_out_time,
            source: model.source,
        }
    }
}
