//! `AegisConfig` (`spec.md` §6): layered configuration — built-in
//! defaults, an optional config file, then environment variable
//! overrides — using the `config` crate exactly as the teacher's
//! server config layer does. Loaded once at process start and handed
//! to [`crate::provider::Provider`] as an explicit value; nothing here
//! is a global.

use serde::Deserialize;
use thiserror::Error;

/// Default token lifetime, in seconds, when `TOKEN_EXPIRY` is unset.
const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 3600;
/// Default authorization-code lifetime. `spec.md` §3 caps this at 600s.
const DEFAULT_CODE_EXPIRY_SECONDS: i64 = 300;
/// Default `state`/PAR record lifetime.
const DEFAULT_STATE_EXPIRY_SECONDS: i64 = 600;
/// Default nonce replay-window lifetime.
const DEFAULT_NONCE_EXPIRY_SECONDS: i64 = 600;
/// Default shard count for the revocation domain absent
/// `AUTHRIM_REVOCATION_SHARDS`.
const DEFAULT_REVOCATION_SHARDS: u32 = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("RP_TOKEN_ENCRYPTION_KEY must be exactly 64 hex characters, got {0}")]
    InvalidEncryptionKey(usize),
}

/// Process-lifetime configuration. Field names match the authoritative
/// environment variable names from `spec.md` §6 (lowercased, since
/// `config::Environment`'s default source maps `FOO_BAR` to `foo_bar`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AegisConfig {
    pub issuer_url: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry: i64,
    #[serde(default = "default_code_expiry")]
    pub code_expiry: i64,
    #[serde(default = "default_state_expiry")]
    pub state_expiry: i64,
    #[serde(default = "default_nonce_expiry")]
    pub nonce_expiry: i64,
    #[serde(default)]
    pub allow_http_redirect: bool,
    pub rp_token_encryption_key: String,
    pub admin_api_secret: String,
    #[serde(default = "default_revocation_shards")]
    pub authrim_revocation_shards: u32,
}

fn default_token_expiry() -> i64 {
    DEFAULT_TOKEN_EXPIRY_SECONDS
}
fn default_code_expiry() -> i64 {
    DEFAULT_CODE_EXPIRY_SECONDS
}
fn default_state_expiry() -> i64 {
    DEFAULT_STATE_EXPIRY_SECONDS
}
fn default_nonce_expiry() -> i64 {
    DEFAULT_NONCE_EXPIRY_SECONDS
}
fn default_revocation_shards() -> u32 {
    DEFAULT_REVOCATION_SHARDS
}

impl AegisConfig {
    /// Load configuration from (in increasing precedence): built-in
    /// defaults, `config_file` if it exists, then environment
    /// variables named per `spec.md` §6.
    ///
    /// # Errors
    /// Returns [`ConfigError::Load`] on a malformed file or missing
    /// required field (`issuer_url`, `rp_token_encryption_key`,
    /// `admin_api_secret` have no defaults), or
    /// [`ConfigError::InvalidEncryptionKey`] if the key isn't exactly
    /// 64 hex characters.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("token_expiry", DEFAULT_TOKEN_EXPIRY_SECONDS)?
            .set_default("code_expiry", DEFAULT_CODE_EXPIRY_SECONDS)?
            .set_default("state_expiry", DEFAULT_STATE_EXPIRY_SECONDS)?
            .set_default("nonce_expiry", DEFAULT_NONCE_EXPIRY_SECONDS)?
            .set_default("allow_http_redirect", false)?
            .set_default("authrim_revocation_shards", DEFAULT_REVOCATION_SHARDS)?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::default().try_parsing(true));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rp_token_encryption_key.len() != 64
            || !self.rp_token_encryption_key.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ConfigError::InvalidEncryptionKey(self.rp_token_encryption_key.len()));
        }
        Ok(())
    }

    /// Decode `rp_token_encryption_key` into the 32 raw bytes
    /// [`aegis_crypto::symmetric::encrypt`]/`decrypt` expect.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidEncryptionKey`] if decoding fails
    /// (unreachable once [`load`](Self::load) has validated the value,
    /// but this is also reachable from a config built by hand in tests).
    pub fn encryption_key_bytes(&self) -> Result<[u8; 32], ConfigError> {
        let bytes = hex::decode(&self.rp_token_encryption_key)
            .map_err(|_| ConfigError::InvalidEncryptionKey(self.rp_token_encryption_key.len()))?;
        bytes.try_into().map_err(|v: Vec<u8>| ConfigError::InvalidEncryptionKey(v.len()))
    }
}
