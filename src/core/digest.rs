//! Challenge digest used by both sides of the handshake.
//!
//! `MD5(cookie ‖ decimal(challenge))`. Proves knowledge of the shared cookie
//! without putting it on the wire.

use md5::{Digest as _, Md5};
use subtle::ConstantTimeEq;

/// Length of a challenge digest in bytes
pub const DIGEST_LEN: usize = 16;

/// Compute the digest for `challenge` under `cookie`.
///
/// The challenge is rendered in base 10 with no sign and no leading zeros.
pub fn digest(cookie: &str, challenge: u32) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5::new();
    hasher.update(cookie.as_bytes());
    hasher.update(challenge.to_string().as_bytes());
    hasher.finalize().into()
}

/// Check a digest received from the peer against the locally computed one.
///
/// The comparison runs in constant time. A slice of the wrong length never
/// matches.
pub fn verify_digest(cookie: &str, challenge: u32, received: &[u8]) -> bool {
    let expected = digest(cookie, challenge);
    received.len() == DIGEST_LEN && bool::from(expected[..].ct_eq(received))
}

/// Fresh random challenge for this side of the handshake.
pub fn generate_challenge() -> u32 {
    rand::random::<u32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            digest("cookie", 0),
            [
                0xe6, 0x07, 0x17, 0x2a, 0x1a, 0x7a, 0xdb, 0x26, 0x2d, 0x2d, 0x98, 0x46, 0x24,
                0x63, 0xb1, 0xa9
            ]
        );
        // MD5("1")
        assert_eq!(
            digest("", 1),
            [
                0xc4, 0xca, 0x42, 0x38, 0xa0, 0xb9, 0x23, 0x82, 0x0d, 0xcc, 0x50, 0x9a, 0x6f,
                0x75, 0x84, 0x9b
            ]
        );
    }

    #[test]
    fn test_verify_digest() {
        let d = digest("secret", 42);
        assert!(verify_digest("secret", 42, &d));
        assert!(!verify_digest("secret", 43, &d));
        assert!(!verify_digest("other", 42, &d));
        assert!(!verify_digest("secret", 42, &d[..15]));
    }

    #[test]
    fn test_challenge_varies() {
        let a = generate_challenge();
        let b = generate_challenge();
        let c = generate_challenge();
        // three identical draws from a 32-bit space would mean a broken RNG
        assert!(!(a == b && b == c));
    }
}
