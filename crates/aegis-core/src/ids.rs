//! Opaque identifier helpers shared across the workspace.
//!
//! `spec.md` §3 requires that all identifiers be treated as opaque byte
//! strings by callers even though several of them encode structured
//! information (shard/generation for sessions and refresh tokens). This
//! module is the single place that generates random opaque material so
//! every crate gets the same entropy source and length guarantees.

use base64::Engine as _;
use rand::RngCore;

/// Minimum length (in base64url characters) required for single-use,
/// bearer-style opaque tokens such as authorization codes (`spec.md` §3:
/// "opaque byte string ... ≥128 chars base64url").
pub const MIN_OPAQUE_CODE_LEN: usize = 128;

/// Generate `byte_len` bytes of CSPRNG material, base64url-encoded without
/// padding. Used for authorization codes, PAR `request_uri` suffixes, and
/// device codes.
#[must_use]
pub fn random_opaque(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate an opaque authorization code of at least
/// [`MIN_OPAQUE_CODE_LEN`] base64url characters.
#[must_use]
pub fn random_authorization_code() -> String {
    // 96 random bytes -> 128 base64url characters exactly.
    random_opaque(96)
}

/// Alphabet used for device-flow user codes: Crockford-like, 32 characters,
/// excluding visually ambiguous glyphs (0/O, 1/I/L), per `spec.md` §3/§4.L.
pub const USER_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Generate a device-flow user code of the form `XXXX-XXXX` using
/// [`USER_CODE_ALPHABET`].
#[must_use]
pub fn random_user_code() -> String {
    let mut rng = rand::rng();
    let mut group = |rng: &mut rand::rngs::ThreadRng| -> String {
        (0..4)
            .map(|_| {
                let idx = (rng.next_u32() as usize) % USER_CODE_ALPHABET.len();
                USER_CODE_ALPHABET[idx] as char
            })
            .collect()
    };
    format!("{}-{}", group(&mut rng), group(&mut rng))
}

/// Generate a `device_code` (a UUIDv4 string per `spec.md` §3).
#[must_use]
pub fn random_device_code() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_code_meets_min_length() {
        let code = random_authorization_code();
        assert!(code.len() >= MIN_OPAQUE_CODE_LEN, "len={}", code.len());
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn user_code_shape() {
        let code = random_user_code();
        assert_eq!(code.len(), 9);
        assert_eq!(code.as_bytes()[4], b'-');
        for c in code.chars().filter(|&c| c != '-') {
            assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "{c} not in alphabet");
        }
    }

    #[test]
    fn device_code_is_uuid() {
        let code = random_device_code();
        assert!(uuid::Uuid::parse_str(&code).is_ok());
    }

    #[test]
    fn random_opaque_is_unique_across_calls() {
        let a = random_opaque(32);
        let b = random_opaque(32);
        assert_ne!(a, b);
    }
}
