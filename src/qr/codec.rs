//! URL-safe base64 without padding, used for both token segments.
//!
//! Encoding strips the trailing `=`; decoding accepts segments with or
//! without padding. A segment whose unpadded length leaves a remainder of 1
//! modulo 4 can never be valid base64 and is rejected up front.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use thiserror::Error;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("segment length {0} is not a valid base64url length")]
    InvalidLength(usize),

    #[error("invalid base64url segment: {0}")]
    Malformed(#[from] base64::DecodeError),
}

#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn decode(segment: &str) -> Result<Vec<u8>, DecodeError> {
    let unpadded = segment.trim_end_matches('=');
    if unpadded.len() % 4 == 1 {
        return Err(DecodeError::InvalidLength(unpadded.len()));
    }

    Ok(URL_SAFE_LENIENT.decode(segment)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_remainders() {
        for len in 0..=9 {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 37 + 250) as u8).collect();
            let encoded = encode(&bytes);
            assert!(!encoded.contains('='));
            assert_eq!(decode(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn uses_url_safe_alphabet() {
        let encoded = encode(&[0xfb, 0xff, 0xbf]);
        assert_eq!(encoded, "-_-_");
        assert!(decode("+/+/").is_err());
    }

    #[test]
    fn accepts_padded_input() {
        assert_eq!(decode("aGk=").unwrap(), b"hi");
        assert_eq!(decode("aGk").unwrap(), b"hi");
        assert_eq!(decode("aA==").unwrap(), b"h");
        assert_eq!(decode("aA").unwrap(), b"h");
    }

    #[test]
    fn rejects_remainder_one() {
        assert_eq!(decode("abcde"), Err(DecodeError::InvalidLength(5)));
        assert_eq!(decode("a"), Err(DecodeError::InvalidLength(1)));
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(decode("ab$d"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("ab d"), Err(DecodeError::Malformed(_))));
    }
}
