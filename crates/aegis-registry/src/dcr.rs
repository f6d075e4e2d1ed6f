//! Dynamic client registration (RFC 7591, `spec.md` §4.O): mint a
//! `client_id`, optionally a `client_secret` (hashed before storage),
//! and a `registration_access_token` the client must present to read or
//! update its own metadata later.

use aegis_core::ids::random_opaque;
use sha2::{Digest, Sha256};

use crate::client::ClientMetadata;
use crate::error::RegistryError;
use crate::profile::CertificationProfile;

/// The caller-supplied portion of a registration request: everything
/// `ClientMetadata` needs except the fields this module mints
/// (`id`, `secret_hash`) or fills from profile defaults when absent.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub tenant_id: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scopes: Vec<String>,
    pub jwks: Option<serde_json::Value>,
    pub jwks_uri: Option<String>,
    pub subject_type: crate::client::SubjectType,
    pub sector_identifier_uri: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
    pub profile: CertificationProfile,
    pub issue_secret: bool,
}

#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub metadata: ClientMetadata,
    /// Plaintext secret, returned exactly once at registration time and
    /// never stored or retrievable again.
    pub client_secret: Option<String>,
    pub registration_access_token: String,
}

/// Apply profile defaults, mint identifiers, hash the secret (if any),
/// and validate the resulting metadata.
///
/// # Errors
/// Propagates [`RegistryError::InvalidMetadata`] from
/// [`crate::client::validate_metadata`].
pub fn register(request: RegistrationRequest) -> Result<RegistrationResult, RegistryError> {
    let defaults = request.profile.defaults();

    let response_types = if request.response_types.is_empty() {
        defaults.response_types
    } else {
        request.response_types
    };
    let token_endpoint_auth_method = request.token_endpoint_auth_method.unwrap_or_else(|| {
        defaults
            .token_endpoint_auth_methods
            .first()
            .cloned()
            .unwrap_or_else(|| "client_secret_basic".to_string())
    });

    let is_public = token_endpoint_auth_method == "none";
    if is_public && !defaults.allow_public_clients {
        return Err(RegistryError::InvalidMetadata(format!(
            "profile {:?} does not allow public clients",
            request.profile
        )));
    }

    let client_id = format!("client_{}", random_opaque(16));
    let (secret_hash, client_secret) = if request.issue_secret && !is_public {
        let secret = random_opaque(32);
        (Some(hash_secret(&secret)), Some(secret))
    } else {
        (None, None)
    };

    let metadata = ClientMetadata {
        id: client_id,
        tenant_id: request.tenant_id,
        secret_hash,
        enabled: true,
        redirect_uris: request.redirect_uris,
        grant_types: request.grant_types,
        response_types,
        scopes: request.scopes,
        jwks: request.jwks,
        jwks_uri: request.jwks_uri,
        id_token_enc_alg: None,
        id_token_enc_enc: None,
        userinfo_enc_alg: None,
        userinfo_enc_enc: None,
        subject_type: request.subject_type,
        sector_identifier_uri: request.sector_identifier_uri,
        token_endpoint_auth_method,
        pkce_required: defaults.pkce_required,
        dpop_required: defaults.require_dpop,
        attribute_mapping: None,
    };

    crate::client::validate_metadata(&metadata)?;

    Ok(RegistrationResult {
        metadata,
        client_secret,
        registration_access_token: format!("reg-{}", random_opaque(32)),
    })
}

/// `sha256:<hex>` digest of a plaintext client secret. Unsalted: unlike
/// password hashing, client secrets are high-entropy CSPRNG output, so a
/// plain digest is sufficient and lets lookups hash the presented secret
/// once and compare, without per-client salt storage.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

/// Constant-time comparison of a presented secret against a stored hash.
#[must_use]
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let candidate = hash_secret(presented);
    aegis_crypto::symmetric::constant_time_eq(candidate.as_bytes(), stored_hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SubjectType;

    fn base_request() -> RegistrationRequest {
        RegistrationRequest {
            tenant_id: "tenant-1".to_string(),
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec![],
            scopes: vec!["openid".to_string()],
            jwks: None,
            jwks_uri: None,
            subject_type: SubjectType::Public,
            sector_identifier_uri: None,
            token_endpoint_auth_method: None,
            profile: CertificationProfile::BasicOp,
            issue_secret: true,
        }
    }

    #[test]
    fn registration_mints_client_id_and_secret() {
        let result = register(base_request()).unwrap();
        assert!(result.metadata.id.starts_with("client_"));
        assert!(result.client_secret.is_some());
        assert!(result.metadata.secret_hash.is_some());
        assert_ne!(result.client_secret.unwrap(), result.metadata.secret_hash.unwrap());
    }

    #[test]
    fn empty_response_types_fall_back_to_profile_defaults() {
        let result = register(base_request()).unwrap();
        assert_eq!(result.metadata.response_types, vec!["code".to_string()]);
    }

    #[test]
    fn none_auth_method_under_non_public_profile_is_rejected() {
        let mut req = base_request();
        req.profile = CertificationProfile::Fapi2;
        req.token_endpoint_auth_method = Some("none".to_string());
        assert!(register(req).is_err());
    }

    #[test]
    fn verify_secret_round_trips() {
        let result = register(base_request()).unwrap();
        let secret = result.client_secret.unwrap();
        assert!(verify_secret(&secret, &result.metadata.secret_hash.unwrap()));
        assert!(!verify_secret("wrong", &hash_secret(&secret)));
    }
}
