//! `at_hash` / `c_hash` / `s_hash` computation (`spec.md` §4.I): base64url
//! of the left half of the hash of an ASCII value, using the hash family
//! that matches the signing algorithm (OIDC Core §3.3.2.11).

use aegis_crypto::SigningAlgorithm;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// `base64url(left_half_bits(hash_family(alg)(ascii(value))))`.
///
/// Used for `at_hash` (over the access token), `c_hash` (over the
/// authorization code), and `s_hash` (over `state`, FAPI profiles).
#[must_use]
pub fn left_half_hash(value: &str, alg: SigningAlgorithm) -> String {
    let digest: Vec<u8> = match alg {
        SigningAlgorithm::Rs256 | SigningAlgorithm::Es256 | SigningAlgorithm::EdDsa => {
            Sha256::digest(value.as_bytes()).to_vec()
        }
        SigningAlgorithm::Es384 => Sha384::digest(value.as_bytes()).to_vec(),
        SigningAlgorithm::Es512 => Sha512::digest(value.as_bytes()).to_vec(),
    };
    let half = &digest[..digest.len() / 2];
    URL_SAFE_NO_PAD.encode(half)
}

/// Hash of an opaque bearer/handle token for use as an introspection cache
/// key, so the raw token value never sits in the cache itself.
#[must_use]
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_family_produces_16_byte_half() {
        let hash = left_half_hash("abc", SigningAlgorithm::Rs256);
        let decoded = URL_SAFE_NO_PAD.decode(hash).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn sha512_family_produces_32_byte_half() {
        let hash = left_half_hash("abc", SigningAlgorithm::Es512);
        let decoded = URL_SAFE_NO_PAD.decode(hash).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            left_half_hash("same-code", SigningAlgorithm::Rs256),
            left_half_hash("same-code", SigningAlgorithm::Rs256)
        );
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        let h = token_hash("opaque-token-value");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
