//! Compact live token: `v1.<base64url(JSON payload)>.<base64url(HMAC)>`.
//!
//! The signature covers the base64url payload string exactly as it appears
//! on the wire, not the raw JSON bytes.

use super::codec;
use super::signer::SignatureService;
use crate::domain::{format_instant, parse_instant};
use crate::models::qr::QrRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_VERSION: &str = "v1";

/// Failures of the pure parsing steps, before any database access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not in v1.<payload>.<signature> form")]
    BadFormat,

    #[error("token segment is not valid base64url")]
    BadEncoding,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token payload is malformed")]
    MalformedPayload,
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPayload {
    /// `company_qr_codes.id`
    pub id: i32,
    pub token: String,
    /// Record expiry, ISO-8601 UTC.
    pub exp: String,
    /// Wall-clock instant at encode time, ISO-8601 UTC. Replay marks key on
    /// this exact string.
    pub live: String,
}

impl TokenPayload {
    #[must_use]
    pub fn for_record(record: &QrRecord, live: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            token: record.token.clone(),
            exp: format_instant(record.expiry_date),
            live: format_instant(live),
        }
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        parse_instant(&self.exp).ok_or(TokenError::MalformedPayload)
    }

    pub fn live_at(&self) -> Result<DateTime<Utc>, TokenError> {
        parse_instant(&self.live).ok_or(TokenError::MalformedPayload)
    }
}

/// Serializes and signs a payload into its wire form.
pub fn encode(payload: &TokenPayload, signer: &SignatureService) -> serde_json::Result<String> {
    let json = serde_json::to_vec(payload)?;
    let payload_b64 = codec::encode(&json);
    let signature = signer.sign(&payload_b64);

    Ok(format!(
        "{TOKEN_VERSION}.{payload_b64}.{}",
        codec::encode(&signature)
    ))
}

/// Builds the live token for a record with `live = now`.
pub fn encode_live(
    record: &QrRecord,
    now: DateTime<Utc>,
    signer: &SignatureService,
) -> serde_json::Result<String> {
    encode(&TokenPayload::for_record(record, now), signer)
}

/// Format, encoding, signature and payload checks, in that order.
pub fn parse(token: &str, signer: &SignatureService) -> Result<TokenPayload, TokenError> {
    let mut parts = token.split('.');
    let (Some(version), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::BadFormat);
    };

    if version != TOKEN_VERSION {
        return Err(TokenError::BadFormat);
    }

    let payload = codec::decode(payload_b64).map_err(|_| TokenError::BadEncoding)?;
    let signature = codec::decode(signature_b64).map_err(|_| TokenError::BadEncoding)?;

    if !signer.verify(payload_b64, &signature) {
        return Err(TokenError::InvalidSignature);
    }

    serde_json::from_slice(&payload).map_err(|_| TokenError::MalformedPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::signer::test_signer;
    use chrono::{Duration, TimeZone};

    fn record() -> QrRecord {
        let generated_at = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();
        QrRecord {
            id: 42,
            company_id: 5,
            token: "ab12cd".to_string(),
            generated_at,
            expiry_date: generated_at + Duration::minutes(10),
            is_active: true,
        }
    }

    fn sign_raw(json: &str) -> String {
        let signer = test_signer();
        let payload_b64 = codec::encode(json.as_bytes());
        let sig = codec::encode(&signer.sign(&payload_b64));
        format!("v1.{payload_b64}.{sig}")
    }

    #[test]
    fn encodes_and_parses() {
        let signer = test_signer();
        let live = Utc.with_ymd_and_hms(2025, 11, 1, 8, 1, 0).unwrap();
        let wire = encode_live(&record(), live, &signer).unwrap();

        assert!(wire.starts_with("v1."));
        assert_eq!(wire.split('.').count(), 3);

        let payload = parse(&wire, &signer).unwrap();
        assert_eq!(payload.id, 42);
        assert_eq!(payload.token, "ab12cd");
        assert_eq!(payload.live_at().unwrap(), live);
        assert_eq!(payload.expires_at().unwrap(), record().expiry_date);
    }

    #[test]
    fn wrong_shape_is_bad_format() {
        let signer = test_signer();
        assert_eq!(parse("", &signer), Err(TokenError::BadFormat));
        assert_eq!(parse("v1.abc", &signer), Err(TokenError::BadFormat));
        assert_eq!(parse("v1.a.b.c", &signer), Err(TokenError::BadFormat));
        assert_eq!(parse("v2.abcd.abcd", &signer), Err(TokenError::BadFormat));
    }

    #[test]
    fn undecodable_segment_is_bad_encoding() {
        let signer = test_signer();
        assert_eq!(parse("v1.a$cd.abcd", &signer), Err(TokenError::BadEncoding));
        assert_eq!(parse("v1.abcd.abcde", &signer), Err(TokenError::BadEncoding));
    }

    #[test]
    fn tampered_payload_is_invalid_signature() {
        let signer = test_signer();
        let wire = encode_live(&record(), Utc::now(), &signer).unwrap();
        let mut parts: Vec<String> = wire.split('.').map(str::to_string).collect();
        let other = TokenPayload {
            id: 43,
            ..TokenPayload::for_record(&record(), Utc::now())
        };
        parts[1] = codec::encode(&serde_json::to_vec(&other).unwrap());

        assert_eq!(parse(&parts.join("."), &signer), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn signed_garbage_is_malformed_payload() {
        let signer = test_signer();
        assert_eq!(parse(&sign_raw("not json"), &signer), Err(TokenError::MalformedPayload));
        assert_eq!(
            parse(&sign_raw(r#"{"id":"5","token":"t","exp":"x","live":"y"}"#), &signer),
            Err(TokenError::MalformedPayload)
        );
        assert_eq!(
            parse(&sign_raw(r#"{"id":5,"token":"t","exp":"x"}"#), &signer),
            Err(TokenError::MalformedPayload)
        );
    }

    #[test]
    fn extra_payload_fields_are_malformed() {
        let signer = test_signer();
        let json = r#"{"id":5,"token":"t","exp":"2025-11-01T08:10:00Z","live":"2025-11-01T08:01:00Z","role":"admin"}"#;
        assert_eq!(parse(&sign_raw(json), &signer), Err(TokenError::MalformedPayload));
    }

    #[test]
    fn unparseable_instants_are_malformed() {
        let signer = test_signer();
        let payload = parse(
            &sign_raw(r#"{"id":5,"token":"t","exp":"soon","live":"now"}"#),
            &signer,
        )
        .unwrap();
        assert_eq!(payload.expires_at(), Err(TokenError::MalformedPayload));
        assert_eq!(payload.live_at(), Err(TokenError::MalformedPayload));
    }
}
