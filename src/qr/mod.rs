//! Live QR token primitives: wire codec, HMAC signing, token parsing,
//! replay marks and PNG rendering.

pub mod codec;
pub mod render;
pub mod replay;
pub mod signer;
pub mod token;

pub use render::RenderError;
pub use replay::{DbReplayGuard, MemoryReplayGuard, ReplayError, ReplayGuard};
pub use signer::{SignatureService, SignerError};
pub use token::{TokenError, TokenPayload};

use rand::RngCore;
use std::fmt::Write;

/// Fresh record token: 32 bytes from the OS-seeded CSPRNG, lower-case hex.
#[must_use]
pub fn generate_record_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tokens_are_random_hex() {
        let a = generate_record_token();
        let b = generate_record_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }
}
