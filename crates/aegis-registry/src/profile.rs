//! Certification profiles (`spec.md` §4.O): named bundles of defaults a
//! registering client can opt into instead of specifying every flag by
//! hand. A profile only supplies *defaults* — explicit fields on the
//! registration request always win.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificationProfile {
    BasicOp,
    ImplicitOp,
    HybridOp,
    Fapi1Advanced,
    Fapi2,
    Fapi2Dpop,
    FapiCiba,
    Development,
}

/// The defaults a profile contributes to a freshly registering client.
/// Fields mirror the subset of [`crate::client::ClientMetadata`] a
/// profile actually opinionates about.
#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub response_types: Vec<String>,
    pub token_endpoint_auth_methods: Vec<String>,
    pub allow_none_algorithm: bool,
    pub pkce_required: bool,
    pub require_par: bool,
    pub require_dpop: bool,
    pub allow_public_clients: bool,
}

impl CertificationProfile {
    #[must_use]
    pub fn defaults(self) -> ProfileDefaults {
        match self {
            Self::BasicOp => ProfileDefaults {
                response_types: vec!["code".to_string()],
                token_endpoint_auth_methods: vec!["client_secret_basic".to_string()],
                allow_none_algorithm: false,
                pkce_required: true,
                require_par: false,
                require_dpop: false,
                allow_public_clients: true,
            },
            Self::ImplicitOp => ProfileDefaults {
                response_types: vec!["id_token".to_string(), "id_token token".to_string()],
                token_endpoint_auth_methods: vec!["none".to_string()],
                allow_none_algorithm: false,
                pkce_required: false,
                require_par: false,
                require_dpop: false,
                allow_public_clients: true,
            },
            Self::HybridOp => ProfileDefaults {
                response_types: vec![
                    "code id_token".to_string(),
                    "code token".to_string(),
                    "code id_token token".to_string(),
                ],
                token_endpoint_auth_methods: vec!["client_secret_basic".to_string()],
                allow_none_algorithm: false,
                pkce_required: true,
                require_par: false,
                require_dpop: false,
                allow_public_clients: false,
            },
            Self::Fapi1Advanced => ProfileDefaults {
                response_types: vec!["code id_token".to_string()],
                token_endpoint_auth_methods: vec!["private_key_jwt".to_string(), "tls_client_auth".to_string()],
                allow_none_algorithm: false,
                pkce_required: true,
                require_par: true,
                require_dpop: false,
                allow_public_clients: false,
            },
            Self::Fapi2 => ProfileDefaults {
                response_types: vec!["code".to_string()],
                token_endpoint_auth_methods: vec!["private_key_jwt".to_string(), "tls_client_auth".to_string()],
                allow_none_algorithm: false,
                pkce_required: true,
                require_par: true,
                require_dpop: false,
                allow_public_clients: false,
            },
            Self::Fapi2Dpop => ProfileDefaults {
                response_types: vec!["code".to_string()],
                token_endpoint_auth_methods: vec!["private_key_jwt".to_string()],
                allow_none_algorithm: false,
                pkce_required: true,
                require_par: true,
                require_dpop: true,
                allow_public_clients: false,
            },
            Self::FapiCiba => ProfileDefaults {
                response_types: vec![],
                token_endpoint_auth_methods: vec!["private_key_jwt".to_string()],
                allow_none_algorithm: false,
                pkce_required: false,
                require_par: false,
                require_dpop: true,
                allow_public_clients: false,
            },
            Self::Development => ProfileDefaults {
                response_types: vec!["code".to_string(), "id_token".to_string(), "code id_token".to_string()],
                token_endpoint_auth_methods: vec![
                    "client_secret_basic".to_string(),
                    "client_secret_post".to_string(),
                    "none".to_string(),
                ],
                allow_none_algorithm: true,
                pkce_required: false,
                require_par: false,
                require_dpop: false,
                allow_public_clients: true,
            },
        }
    }
}
