//! Authorization request validation pipeline (`spec.md` §4.K, steps 1-7).
//!
//! `client_id`/`redirect_uri` failures are the only ones returned as a
//! direct 400 — once those two are established, every later failure must
//! redirect back to the relying party carrying `error`/`error_description`,
//! so [`validate`] returns a [`ValidationOutcome`] that tells the caller
//! which shape applies.

use aegis_core::{OpError, OpResult};

use crate::client::{ClientLookup, ClientProfile};
use crate::request::{AuthorizationRequest, ResponseMode, ResponseType};

const MAX_STATE_NONCE_LEN: usize = 512;
const MIN_PKCE_CHALLENGE_LEN: usize = 43;

/// A request that passed `client_id`/`redirect_uri` validation, so any
/// further failure is reported via redirect rather than a direct 400.
pub struct PreRedirectValidated {
    pub request: AuthorizationRequest,
    pub client: ClientProfile,
}

pub struct ValidatedRequest {
    pub request: AuthorizationRequest,
    pub client: ClientProfile,
    pub response_type: ResponseType,
    pub response_mode: ResponseMode,
}

/// Whether an `http://` (non-TLS) redirect_uri is acceptable: loopback
/// addresses always are (native-app pattern, RFC 8252 §7.3); otherwise
/// only when the deployment has explicitly opted in.
#[must_use]
pub fn is_acceptable_http_redirect(redirect_uri: &url::Url, allow_http_redirect: bool) -> bool {
    if redirect_uri.scheme() != "http" {
        return true;
    }
    if allow_http_redirect {
        return true;
    }
    matches!(redirect_uri.host_str(), Some("localhost" | "127.0.0.1" | "::1"))
}

/// Steps 2-3: resolve and validate `client_id`/`redirect_uri`. Failures
/// here are the only ones the caller should render as a direct 400 JSON
/// response instead of a redirect.
///
/// # Errors
/// Returns `invalid_request` (unknown/disabled client) or
/// `invalid_request` (redirect_uri not registered / disallowed scheme).
pub fn validate_client_and_redirect(
    request: AuthorizationRequest,
    lookup: &dyn ClientLookup,
) -> OpResult<PreRedirectValidated> {
    let client = lookup
        .find(&request.client_id)
        .ok_or_else(|| OpError::invalid_client("unknown client_id"))?;
    if !client.enabled {
        return Err(OpError::invalid_client("client is disabled"));
    }

    let parsed = url::Url::parse(&request.redirect_uri)
        .map_err(|e| OpError::invalid_request(format!("redirect_uri is not a valid URI: {e}")))?;
    if parsed.fragment().is_some() {
        return Err(OpError::invalid_request("redirect_uri must not contain a fragment"));
    }
    if !client.allows_redirect_uri(&request.redirect_uri) {
        return Err(OpError::invalid_request("redirect_uri is not registered for this client"));
    }
    if !is_acceptable_http_redirect(&parsed, client.allow_http_redirect) {
        return Err(OpError::invalid_request(
            "http redirect_uri is only permitted for loopback addresses",
        ));
    }

    Ok(PreRedirectValidated { request, client })
}

/// Steps 1, 4-7: everything that, once failed, must still redirect back
/// to the relying party with an `error` parameter.
///
/// # Errors
/// Returns `unsupported_response_type`, `invalid_scope`,
/// `unauthorized_client` (PKCE required but absent), `invalid_request`
/// (PKCE method/shape, state/nonce length, fragment-forbidden-with-code),
/// or `invalid_request` (missing nonce for an implicit/hybrid response
/// type).
pub fn validate_post_redirect(input: PreRedirectValidated) -> OpResult<ValidatedRequest> {
    let PreRedirectValidated { request, client } = input;

    let response_type = ResponseType::parse(&request.response_type)
        .ok_or_else(|| OpError::unsupported_response_type("response_type is not recognized"))?;
    if !client.allows_response_type(response_type) {
        return Err(OpError::unsupported_response_type(
            "response_type is not permitted by this client's active profile",
        ));
    }

    if request.wants_openid() && !request.scope.split_whitespace().any(|s| s == "openid") {
        return Err(OpError::invalid_scope("OIDC flows require the openid scope"));
    }
    if request.scope.trim().is_empty() {
        return Err(OpError::invalid_scope("scope must be present"));
    }

    match &request.pkce {
        Some(pkce) => {
            if pkce.code_challenge_method != "S256" {
                return Err(OpError::invalid_request("code_challenge_method must be S256"));
            }
            if pkce.code_challenge.len() < MIN_PKCE_CHALLENGE_LEN {
                return Err(OpError::invalid_request("code_challenge is too short"));
            }
        }
        None if client.is_public || client.pkce_required => {
            return Err(OpError::invalid_request("PKCE is required for this client"));
        }
        None => {}
    }

    if let Some(state) = &request.state
        && state.len() > MAX_STATE_NONCE_LEN
    {
        return Err(OpError::invalid_request("state exceeds maximum length"));
    }
    if let Some(nonce) = &request.nonce
        && nonce.len() > MAX_STATE_NONCE_LEN
    {
        return Err(OpError::invalid_request("nonce exceeds maximum length"));
    }
    if response_type.requires_nonce() && request.nonce.is_none() {
        return Err(OpError::invalid_request(
            "nonce is required when response_type includes id_token or token",
        ));
    }

    let response_mode = match request.response_mode.as_deref() {
        Some("query") => ResponseMode::Query,
        Some("fragment") => ResponseMode::Fragment,
        Some("form_post") => ResponseMode::FormPost,
        Some(other) => return Err(OpError::invalid_request(format!("unsupported response_mode: {other}"))),
        None => ResponseMode::default_for(response_type),
    };
    if response_type.is_code_only() && response_mode == ResponseMode::Fragment {
        return Err(OpError::invalid_request("response_mode=fragment is forbidden for response_type=code"));
    }

    Ok(ValidatedRequest { request, client, response_type, response_mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PkceParams;

    struct FakeRegistry(Vec<ClientProfile>);
    impl ClientLookup for FakeRegistry {
        fn find(&self, client_id: &str) -> Option<ClientProfile> {
            self.0.iter().find(|c| c.client_id == client_id).cloned()
        }
    }

    fn public_client() -> ClientProfile {
        ClientProfile {
            client_id: "client-1".to_string(),
            enabled: true,
            is_public: true,
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            allowed_response_types: vec![ResponseType::Code, ResponseType::CodeIdToken],
            pkce_required: true,
            allow_http_redirect: false,
        }
    }

    fn base_request() -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: "client-1".to_string(),
            redirect_uri: "https://rp.example/cb".to_string(),
            response_type: "code".to_string(),
            scope: "openid".to_string(),
            state: Some("xyz".to_string()),
            nonce: None,
            pkce: Some(PkceParams {
                code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string(),
                code_challenge_method: "S256".to_string(),
            }),
            response_mode: None,
            max_age: None,
            prompt: None,
            ui_locales: None,
            acr_values: None,
            claims: None,
            request_jwt: None,
        }
    }

    #[test]
    fn happy_path_validates() {
        let registry = FakeRegistry(vec![public_client()]);
        let pre = validate_client_and_redirect(base_request(), &registry).unwrap();
        let validated = validate_post_redirect(pre).unwrap();
        assert_eq!(validated.response_mode, ResponseMode::Query);
    }

    #[test]
    fn unknown_client_is_pre_redirect_error() {
        let registry = FakeRegistry(vec![]);
        assert!(validate_client_and_redirect(base_request(), &registry).is_err());
    }

    #[test]
    fn unregistered_redirect_uri_is_pre_redirect_error() {
        let registry = FakeRegistry(vec![public_client()]);
        let mut req = base_request();
        req.redirect_uri = "https://evil.example/cb".to_string();
        assert!(validate_client_and_redirect(req, &registry).is_err());
    }

    #[test]
    fn public_client_requires_pkce() {
        let registry = FakeRegistry(vec![public_client()]);
        let mut req = base_request();
        req.pkce = None;
        let pre = validate_client_and_redirect(req, &registry).unwrap();
        assert!(validate_post_redirect(pre).is_err());
    }

    #[test]
    fn fragment_forbidden_for_code_only() {
        let registry = FakeRegistry(vec![public_client()]);
        let mut req = base_request();
        req.response_mode = Some("fragment".to_string());
        let pre = validate_client_and_redirect(req, &registry).unwrap();
        assert!(validate_post_redirect(pre).is_err());
    }

    #[test]
    fn hybrid_requires_nonce() {
        let registry = FakeRegistry(vec![public_client()]);
        let mut req = base_request();
        req.response_type = "code id_token".to_string();
        let pre = validate_client_and_redirect(req, &registry).unwrap();
        assert!(validate_post_redirect(pre).is_err());
    }

    #[test]
    fn loopback_http_redirect_allowed() {
        let mut client = public_client();
        client.redirect_uris = vec!["http://127.0.0.1:4321/cb".to_string()];
        let registry = FakeRegistry(vec![client]);
        let mut req = base_request();
        req.redirect_uri = "http://127.0.0.1:4321/cb".to_string();
        assert!(validate_client_and_redirect(req, &registry).is_ok());
    }
}
