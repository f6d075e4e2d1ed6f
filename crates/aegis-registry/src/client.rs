//! Client metadata (`spec.md` §3 "Client") and its validation rules
//! (`spec.md` §4.O).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Public,
    Pairwise,
}

/// A registered client's full metadata row.
///
/// `secret_hash` holds a salted digest, never the plaintext secret
/// (`spec.md` §4.O: "optionally client_secret, hashed before storage").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub id: String,
    pub tenant_id: String,
    pub secret_hash: Option<String>,
    pub enabled: bool,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scopes: Vec<String>,
    pub jwks: Option<serde_json::Value>,
    pub jwks_uri: Option<String>,
    pub id_token_enc_alg: Option<String>,
    pub id_token_enc_enc: Option<String>,
    pub userinfo_enc_alg: Option<String>,
    pub userinfo_enc_enc: Option<String>,
    pub subject_type: SubjectType,
    pub sector_identifier_uri: Option<String>,
    pub token_endpoint_auth_method: String,
    pub pkce_required: bool,
    pub dpop_required: bool,
    pub attribute_mapping: Option<HashMap<String, String>>,
}

impl ClientMetadata {
    /// Every distinct redirect_uri host, in registration order with
    /// duplicates removed. Used both for the pairwise sector invariant
    /// and for the single-redirect-host fallback when no
    /// `sector_identifier_uri` is set (`spec.md` §4.P).
    #[must_use]
    pub fn redirect_hosts(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for uri in &self.redirect_uris {
            if let Some(host) = extract_host(uri) {
                if !seen.contains(&host) {
                    seen.push(host);
                }
            }
        }
        seen
    }
}

fn extract_host(uri: &str) -> Option<String> {
    url::Url::parse(uri).ok().and_then(|u| u.host_str().map(ToString::to_string))
}

/// Validate a client's own metadata invariants (`spec.md` §3):
/// non-empty redirect_uris, has at least one response_type, and — when
/// `subject_type=pairwise` with more than one redirect host — requires
/// a `sector_identifier_uri` to be set (its actual content is validated
/// separately once fetched, by `aegis-policy`).
///
/// # Errors
/// Returns [`RegistryError::InvalidMetadata`] for any structural
/// violation.
pub fn validate_metadata(metadata: &ClientMetadata) -> Result<(), crate::error::RegistryError> {
    use crate::error::RegistryError;

    if metadata.redirect_uris.is_empty() {
        return Err(RegistryError::InvalidMetadata("redirect_uris must not be empty".to_string()));
    }
    if metadata.response_types.is_empty() {
        return Err(RegistryError::InvalidMetadata("response_types must not be empty".to_string()));
    }
    if metadata.jwks.is_some() && metadata.jwks_uri.is_some() {
        return Err(RegistryError::InvalidMetadata("jwks and jwks_uri are mutually exclusive".to_string()));
    }

    let hosts = metadata.redirect_hosts();
    if metadata.subject_type == SubjectType::Pairwise
        && hosts.len() > 1
        && metadata.sector_identifier_uri.is_none()
    {
        return Err(RegistryError::InvalidMetadata(
            "pairwise subject_type with multiple redirect hosts requires sector_identifier_uri".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ClientMetadata {
        ClientMetadata {
            id: "client-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            secret_hash: None,
            enabled: true,
            redirect_uris: vec!["https://a.example/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            scopes: vec!["openid".to_string()],
            jwks: None,
            jwks_uri: None,
            id_token_enc_alg: None,
            id_token_enc_enc: None,
            userinfo_enc_alg: None,
            userinfo_enc_enc: None,
            subject_type: SubjectType::Public,
            sector_identifier_uri: None,
            token_endpoint_auth_method: "client_secret_basic".to_string(),
            pkce_required: true,
            dpop_required: false,
            attribute_mapping: None,
        }
    }

    #[test]
    fn rejects_empty_redirect_uris() {
        let mut m = base();
        m.redirect_uris.clear();
        assert!(validate_metadata(&m).is_err());
    }

    #[test]
    fn pairwise_with_single_host_needs_no_sector_uri() {
        let mut m = base();
        m.subject_type = SubjectType::Pairwise;
        assert!(validate_metadata(&m).is_ok());
    }

    #[test]
    fn pairwise_with_multiple_hosts_requires_sector_uri() {
        let mut m = base();
        m.subject_type = SubjectType::Pairwise;
        m.redirect_uris.push("https://b.example/cb".to_string());
        assert!(validate_metadata(&m).is_err());
        m.sector_identifier_uri = Some("https://sector.example/list.json".to_string());
        assert!(validate_metadata(&m).is_ok());
    }

    #[test]
    fn rejects_jwks_and_jwks_uri_together() {
        let mut m = base();
        m.jwks = Some(serde_json::json!({ "keys": [] }));
        m.jwks_uri = Some("https://jwks.example".to_string());
        assert!(validate_metadata(&m).is_err());
    }

    #[test]
    fn redirect_hosts_deduplicates() {
        let mut m = base();
        m.redirect_uris.push("https://a.example/other-cb".to_string());
        assert_eq!(m.redirect_hosts(), vec!["a.example".to_string()]);
    }
}
