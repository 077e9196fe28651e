use serde::{Deserialize, Serialize};

use crate::domain::format_instant;
use crate::models::qr::QrRecord;
use crate::services::LeaveQr;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.into()),
        }
    }
}

/// QR record as exposed over HTTP. The record token itself is never listed;
/// clients obtain signed live tokens instead.
#[derive(Debug, Serialize)]
pub struct QrRecordDto {
    pub id: i32,
    pub company_id: i32,
    pub generated_at: String,
    pub expiry_date: String,
    pub is_active: bool,
}

impl From<&QrRecord> for QrRecordDto {
    fn from(record: &QrRecord) -> Self {
        Self {
            id: record.id,
            company_id: record.company_id,
            generated_at: format_instant(record.generated_at),
            expiry_date: format_instant(record.expiry_date),
            is_active: record.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LiveTokenDto {
    pub qr_id: i32,
    pub token: String,
    pub expiry_date: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveQrDto {
    pub qr: QrRecordDto,
    pub start_url: String,
    /// Base64 (standard alphabet) PNG of the start link.
    pub image_png_base64: String,
}

impl From<&LeaveQr> for LeaveQrDto {
    fn from(leave: &LeaveQr) -> Self {
        use base64::Engine;

        Self {
            qr: QrRecordDto::from(&leave.record),
            start_url: leave.start_url.clone(),
            image_png_base64: base64::engine::general_purpose::STANDARD.encode(&leave.png),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityQuery {
    pub valid_minutes: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQuery {
    #[serde(default)]
    pub mode: Option<String>,
    pub pixels_per_module: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub token_string: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveStartQuery {
    pub company_id: i32,
    pub qr_id: i32,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}
