//! HMAC-SHA256 signing of the token payload segment.
//!
//! # Security Properties
//!
//! - The key is held in a [`SecretSlice`] and never appears in `Debug` output
//! - Verification compares in constant time through `subtle`
//! - Empty inputs verify as `false`, they never error

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of an HMAC-SHA256 tag.
pub const SIGNATURE_LEN: usize = 32;

/// Shortest key accepted.
pub const MIN_KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("HMAC key must be at least {MIN_KEY_LEN} bytes, got {0}")]
    KeyTooShort(usize),
}

/// Signs and verifies payload segments with the process-wide HMAC key.
///
/// Built once at startup from configuration and shared behind an `Arc`.
pub struct SignatureService {
    key: SecretSlice<u8>,
    mac: HmacSha256,
}

impl SignatureService {
    pub fn new(key: &SecretSlice<u8>) -> Result<Self, SignerError> {
        let bytes = key.expose_secret();
        if bytes.len() < MIN_KEY_LEN {
            return Err(SignerError::KeyTooShort(bytes.len()));
        }

        // HMAC accepts keys of any length.
        let Ok(mac) = HmacSha256::new_from_slice(bytes) else {
            return Err(SignerError::KeyTooShort(bytes.len()));
        };

        Ok(Self {
            key: SecretSlice::from(bytes.to_vec()),
            mac,
        })
    }

    /// HMAC-SHA256 over the UTF-8 bytes of the base64url payload string.
    #[must_use]
    pub fn sign(&self, payload_b64: &str) -> [u8; SIGNATURE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().into()
    }

    #[must_use]
    pub fn verify(&self, payload_b64: &str, signature: &[u8]) -> bool {
        if payload_b64.is_empty() || signature.is_empty() {
            return false;
        }

        let expected = self.sign(payload_b64);
        expected.as_slice().ct_eq(signature).into()
    }

    #[must_use]
    pub fn key_len(&self) -> usize {
        self.key.expose_secret().len()
    }
}

impl fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureService")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_signer() -> SignatureService {
    let key: SecretSlice<u8> = SecretSlice::from(vec![7u8; MIN_KEY_LEN]);
    SignatureService::new(&key).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer_with(byte: u8) -> SignatureService {
        SignatureService::new(&SecretSlice::from(vec![byte; 48])).unwrap()
    }

    #[test]
    fn matches_reference_hmac() {
        let signer = signer_with(1);
        let mut mac = HmacSha256::new_from_slice(&[1u8; 48]).unwrap();
        mac.update(b"eyJpZCI6MX0");
        let expected: [u8; 32] = mac.finalize().into_bytes().into();

        assert_eq!(signer.sign("eyJpZCI6MX0"), expected);
    }

    #[test]
    fn verifies_own_signature() {
        let signer = test_signer();
        let sig = signer.sign("payload");
        assert!(signer.verify("payload", &sig));
    }

    #[test]
    fn any_single_character_change_fails() {
        let signer = test_signer();
        let payload = "eyJpZCI6NSwidG9rZW4iOiJhYmMifQ";
        let sig = signer.sign(payload);

        for (idx, original) in payload.char_indices() {
            let replacement = if original == 'A' { 'B' } else { 'A' };
            let mut tampered = payload.to_string();
            tampered.replace_range(idx..=idx, &replacement.to_string());
            assert!(!signer.verify(&tampered, &sig), "tamper at {idx} accepted");
        }
    }

    #[test]
    fn rejects_other_key_and_truncated_signature() {
        let sig = signer_with(1).sign("payload");
        assert!(!signer_with(2).verify("payload", &sig));
        assert!(!signer_with(1).verify("payload", &sig[..16]));
    }

    #[test]
    fn empty_inputs_are_false() {
        let signer = test_signer();
        let sig = signer.sign("payload");
        assert!(!signer.verify("", &sig));
        assert!(!signer.verify("payload", &[]));
    }

    #[test]
    fn short_key_rejected() {
        let err = SignatureService::new(&SecretSlice::from(vec![1u8; 16])).unwrap_err();
        assert_eq!(err, SignerError::KeyTooShort(16));
    }

    #[test]
    fn debug_redacts_key() {
        let signer = signer_with(0x41);
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("65"));
        assert_eq!(signer.key_len(), 48);
    }
}
