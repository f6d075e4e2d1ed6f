//! Symmetric primitives: AES-256-GCM envelope encryption, constant-time
//! comparisons, and the HMAC helpers used to bind email verification codes
//! to a session (`spec.md` §4.B, component B).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` (32 bytes) and return
/// `base64url(iv ‖ ciphertext ‖ tag)`.
///
/// This is the envelope format `spec.md` §4.B mandates for anything the
/// provider encrypts at rest or hands back to a client as an opaque blob
/// (e.g. PAR `request_uri` payloads, upstream IdP refresh tokens).
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Inverse of [`encrypt`]. Rejects ciphertexts too short to contain a
/// nonce and tag, and any ciphertext that fails authentication.
pub fn decrypt(encoded: &str, key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

    if raw.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, Payload { msg: sealed, aad: &[] })
        .map_err(|_| CryptoError::TamperedCiphertext)
}

type HmacSha256 = Hmac<Sha256>;

/// Binds a one-time email verification code to the session that requested
/// it, so a code intercepted in transit cannot be replayed against a
/// different session.
///
/// `hash = hex(HMAC-SHA256(secret, code || email_lower || session_id || issued_at))`
#[must_use]
pub fn hash_email_code(
    code: &str,
    email_lower: &str,
    session_id: &str,
    issued_at_millis: i64,
    secret: &[u8],
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(code.as_bytes());
    mac.update(email_lower.as_bytes());
    mac.update(session_id.as_bytes());
    mac.update(issued_at_millis.to_le_bytes().as_slice());
    hex::encode(mac.finalize().into_bytes())
}

/// `hex(SHA-256(lowercase(email)))`, used as the tombstone lookup key so
/// raw email addresses never sit in the tombstone store (`spec.md` §4.R).
#[must_use]
pub fn hash_email(email: &str) -> String {
    let digest = Sha256::digest(email.to_lowercase().as_bytes());
    hex::encode(digest)
}

/// Constant-time byte comparison. Use this for anything derived from a
/// secret (codes, hashes, tokens) instead of `==`.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

const OTP_DIGITS: u32 = 6;

/// Generate a CSPRNG-backed numeric one-time code, zero-padded to
/// [`OTP_DIGITS`] digits.
#[must_use]
pub fn random_otp() -> String {
    let modulus = 10u32.pow(OTP_DIGITS);
    let value = rand::rng().next_u32() % modulus;
    format!("{value:0width$}", width = OTP_DIGITS as usize)
}
