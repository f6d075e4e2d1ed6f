//! `AuthorizeEngine` (`spec.md` §4.K): ties the validation pipeline,
//! response-mode selection, and hybrid-flow hash computation together
//! into the authorize endpoint's two halves — `begin` (validate) and
//! `finalize` (mint success material after the user authenticates and,
//! if required, consents).

use std::sync::Arc;

use aegis_core::{OpError, OpResult};
use aegis_crypto::KeyRing;
use aegis_grants::{CodeStore, ParStore};
use aegis_tokens::service::{AccessTokenKind, IdTokenClaims, TokenService};

use crate::client::{ClientJwksLookup, ClientLookup};
use crate::redirect::{error_params, RedirectTarget};
use crate::request::{AuthorizationRequest, ResponseMode};
use crate::validate::{validate_client_and_redirect, validate_post_redirect, ValidatedRequest};

/// Refresh family lifetime minted alongside an `authorization_code`
/// grant's access token, matching `DeviceFlow::token`'s convention.
const REFRESH_FAMILY_TTL_SECONDS: i64 = 30 * 24 * 3600;

/// Either a direct 400 (client_id/redirect_uri failed validation — there
/// is no safe place to redirect the error to) or a redirect carrying the
/// error, per `spec.md` §4.K's pre-redirect/post-redirect split.
pub enum AuthorizeError {
    Direct(aegis_core::OpError),
    Redirect(RedirectTarget),
}

pub struct FinalizeInput {
    pub subject: String,
    pub auth_time: i64,
    pub amr: Vec<String>,
    pub access_token_kind: AccessTokenKind,
    pub dpop_jkt: Option<String>,
}

/// Full token set returned by the `authorization_code` grant
/// (`spec.md` §4.H, §6, §8 scenario 1).
pub struct CodeGrantTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: String,
    pub token_type: &'static str,
}

pub struct AuthorizeEngine {
    clients: Arc<dyn ClientLookup>,
    codes: Arc<CodeStore>,
    par: Arc<ParStore>,
    tokens: Arc<TokenService>,
    keyring: Arc<KeyRing>,
    jwks_lookup: Option<Arc<dyn ClientJwksLookup>>,
    jwe_private_key_pem: Option<String>,
    issuer: String,
    code_ttl_seconds: i64,
    access_token_ttl_seconds: i64,
}

impl AuthorizeEngine {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clients: Arc<dyn ClientLookup>,
        codes: Arc<CodeStore>,
        par: Arc<ParStore>,
        tokens: Arc<TokenService>,
        keyring: Arc<KeyRing>,
        jwks_lookup: Option<Arc<dyn ClientJwksLookup>>,
        jwe_private_key_pem: Option<String>,
        issuer: impl Into<String>,
        code_ttl_seconds: i64,
        access_token_ttl_seconds: i64,
    ) -> Self {
        Self {
            clients,
            codes,
            par,
            tokens,
            keyring,
            jwks_lookup,
            jwe_private_key_pem,
            issuer: issuer.into(),
            code_ttl_seconds,
            access_token_ttl_seconds,
        }
    }

    /// Push a pre-validated authorization request (`spec.md` §4.J, RFC
    /// 9126) and return its `request_uri`. Validated exactly as
    /// [`Self::begin`] would, minus user interaction.
    ///
    /// # Errors
    /// See [`AuthorizeError`].
    pub fn push_par(&self, request: AuthorizationRequest, ttl_seconds: i64) -> Result<String, AuthorizeError> {
        let client_id = request.client_id.clone();
        self.begin(request.clone())?;
        let params = serde_json::to_value(&request).map_err(|e| AuthorizeError::Direct(OpError::from(e)))?;
        Ok(self.par.push(client_id, params, ttl_seconds))
    }

    /// Resolve the effective request: if `request_uri` is present, consume
    /// the pushed record and use it as-is (RFC 9126 §3); otherwise, if
    /// `request.request_jwt` is present, decode and verify it (`spec.md`
    /// §4.J) and let its claims override same-named query parameters.
    /// With neither, `request` is returned unchanged.
    ///
    /// # Errors
    /// Returns `invalid_request` if `request_uri` doesn't resolve, if a
    /// request object is present but no `jwks_lookup` was configured, or
    /// if decode/verification fails.
    pub async fn resolve_request(
        &self,
        request: AuthorizationRequest,
        request_uri: Option<String>,
    ) -> OpResult<AuthorizationRequest> {
        if let Some(request_uri) = request_uri {
            let params = self.par.consume(&request_uri, &request.client_id)?;
            let resolved: AuthorizationRequest = serde_json::from_value(params)?;
            return Ok(resolved);
        }

        let Some(jar_value) = request.request_jwt.clone() else {
            return Ok(request);
        };

        let jwks_lookup = self
            .jwks_lookup
            .as_ref()
            .ok_or_else(|| OpError::invalid_request("request objects are not supported by this deployment"))?;
        let client_jwks = jwks_lookup.jwks(&request.client_id).await?;
        let claims = aegis_grants::jar::decode_and_verify(
            &jar_value,
            &client_jwks,
            &request.client_id,
            self.jwe_private_key_pem.as_deref(),
        )?;

        let mut merged = serde_json::to_value(&request)?;
        if let (Some(merged_fields), serde_json::Value::Object(claim_fields)) = (merged.as_object_mut(), claims) {
            for (key, value) in claim_fields {
                if key == "client_id" {
                    continue;
                }
                merged_fields.insert(key, value);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    /// `authorization_code` grant (`spec.md` §4.H, §6): consume `code`
    /// and mint the matching access/id/refresh token set.
    ///
    /// # Errors
    /// Propagates [`CodeStore::consume`]'s `invalid_grant` errors and
    /// signing/minting failures.
    #[allow(clippy::too_many_arguments)]
    pub async fn exchange_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        access_token_kind: AccessTokenKind,
        dpop_jkt: Option<String>,
        issue_refresh_token: bool,
    ) -> OpResult<CodeGrantTokens> {
        let consumed = self.codes.consume(code, client_id, redirect_uri, code_verifier)?;

        let minted = self.tokens.mint_access_token(
            access_token_kind,
            client_id,
            &consumed.subject,
            &consumed.scope,
            self.access_token_ttl_seconds,
            dpop_jkt,
            None,
        )?;

        let refresh_token = if issue_refresh_token {
            Some(
                self.tokens
                    .mint_refresh_family(&consumed.subject, client_id, &consumed.scope, REFRESH_FAMILY_TTL_SECONDS)
                    .await?,
            )
        } else {
            None
        };

        let id_token = if consumed.scope.split_whitespace().any(|s| s == "openid") {
            let alg = self.keyring.active().algorithm;
            let now = aegis_core::clock::now_millis() / 1000;
            let claims = IdTokenClaims {
                iss: self.issuer.clone(),
                sub: consumed.subject.clone(),
                aud: client_id.to_string(),
                exp: now + 300,
                iat: now,
                auth_time: consumed.auth_time,
                nonce: consumed.nonce.clone(),
                acr: None,
                amr: if consumed.amr.is_empty() { None } else { Some(consumed.amr.clone()) },
                at_hash: Some(aegis_tokens::left_half_hash(&minted.value, alg)),
                c_hash: None,
                s_hash: None,
            };
            Some(self.tokens.mint_id_token(claims)?)
        } else {
            None
        };

        Ok(CodeGrantTokens {
            access_token: minted.value,
            id_token,
            refresh_token,
            scope: consumed.scope,
            token_type: "Bearer",
        })
    }

    /// Validate an incoming request. Returns the validated request on
    /// success, or an [`AuthorizeError`] telling the caller whether to
    /// render a direct 400 or a redirect carrying the error.
    ///
    /// # Errors
    /// See [`AuthorizeError`].
    pub fn begin(&self, request: AuthorizationRequest) -> Result<ValidatedRequest, AuthorizeError> {
        let pre = validate_client_and_redirect(request, self.clients.as_ref()).map_err(AuthorizeError::Direct)?;
        let redirect_uri = pre.request.redirect_uri.clone();
        let state = pre.request.state.clone();
        let mode = ResponseMode::effective_for_error(&pre.request);
        validate_post_redirect(pre).map_err(|err| {
            AuthorizeError::Redirect(RedirectTarget::build(&redirect_uri, mode, error_params(&err, state.as_deref())))
        })
    }

    /// Mint success material (code/id_token/access_token as the
    /// response_type requires) and build the redirect/form_post target,
    /// including `c_hash`/`at_hash`/`s_hash` whenever applicable.
    ///
    /// # Errors
    /// Propagates signing/minting failures from `TokenService`.
    pub async fn finalize(&self, validated: ValidatedRequest, input: FinalizeInput) -> OpResult<RedirectTarget> {
        let ValidatedRequest { request, response_type, response_mode, .. } = validated;
        let alg = self.keyring.active().algorithm;

        let mut params = Vec::new();
        let mut code_value = None;

        if response_type.includes_code() {
            let code = self.codes.mint(
                request.client_id.clone(),
                request.redirect_uri.clone(),
                request.scope.clone(),
                input.subject.clone(),
                request.nonce.clone(),
                request.pkce.as_ref().map(|p| aegis_grants::code::Pkce {
                    challenge: p.code_challenge.clone(),
                    method: aegis_grants::code::PkceMethod::S256,
                }),
                request.max_age,
                input.amr.clone(),
                input.auth_time,
                self.code_ttl_seconds,
            )?;
            params.push(("code".to_string(), code.clone()));
            code_value = Some(code);
        }

        let mut access_token_value = None;
        if response_type.includes_token() {
            let minted = self.tokens.mint_access_token(
                input.access_token_kind,
                &request.client_id,
                &input.subject,
                &request.scope,
                self.access_token_ttl_seconds,
                input.dpop_jkt.clone(),
                None,
            )?;
            params.push(("access_token".to_string(), minted.value.clone()));
            params.push(("token_type".to_string(), "Bearer".to_string()));
            params.push(("expires_in".to_string(), self.access_token_ttl_seconds.to_string()));
            access_token_value = Some(minted.value);
        }

        if response_type.includes_id_token() {
            let now = aegis_core::clock::now_millis() / 1000;
            let claims = IdTokenClaims {
                iss: self.issuer.clone(),
                sub: input.subject.clone(),
                aud: request.client_id.clone(),
                exp: now + 300,
                iat: now,
                auth_time: input.auth_time,
                nonce: request.nonce.clone(),
                acr: None,
                amr: if input.amr.is_empty() { None } else { Some(input.amr.clone()) },
                at_hash: access_token_value.as_deref().map(|t| aegis_tokens::left_half_hash(t, alg)),
                c_hash: code_value.as_deref().map(|c| aegis_tokens::left_half_hash(c, alg)),
                s_hash: request.state.as_deref().map(|s| aegis_tokens::left_half_hash(s, alg)),
            };
            let id_token = self.tokens.mint_id_token(claims)?;
            params.push(("id_token".to_string(), id_token));
        }

        if let Some(state) = &request.state {
            params.push(("state".to_string(), state.clone()));
        }

        Ok(RedirectTarget::build(&request.redirect_uri, response_mode, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientProfile;
    use crate::request::{PkceParams, ResponseType};

    struct FakeRegistry(Vec<ClientProfile>);
    impl ClientLookup for FakeRegistry {
        fn find(&self, client_id: &str) -> Option<ClientProfile> {
            self.0.iter().find(|c| c.client_id == client_id).cloned()
        }
    }

    fn confidential_client() -> ClientProfile {
        ClientProfile {
            client_id: "client-1".to_string(),
            enabled: true,
            is_public: false,
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            allowed_response_types: vec![ResponseType::Code],
            pkce_required: false,
            allow_http_redirect: false,
        }
    }

    fn base_request() -> AuthorizationRequest {
        AuthorizationRequest {
            client_id: "client-1".to_string(),
            redirect_uri: "https://rp.example/cb".to_string(),
            response_type: "code".to_string(),
            scope: "read".to_string(),
            state: None,
            nonce: None,
            pkce: None,
            response_mode: None,
            max_age: None,
            prompt: None,
            ui_locales: None,
            acr_values: None,
            claims: None,
            request_jwt: None,
        }
    }

    fn test_signing_key() -> aegis_crypto::SigningKey {
        aegis_crypto::SigningKey {
            kid: "test-kid".to_string(),
            algorithm: aegis_crypto::SigningAlgorithm::Rs256,
            private_key_pem: Vec::new(),
            public_jwk: serde_json::json!({ "kty": "RSA", "kid": "test-kid" }),
            created_at: std::time::SystemTime::now(),
            retired_at: None,
        }
    }

    fn engine() -> AuthorizeEngine {
        let keyring = Arc::new(KeyRing::new(test_signing_key(), aegis_crypto::SigningProfile::default()));
        let shard_store = Arc::new(aegis_shard::store::InMemoryShardConfigStore::new());
        let shard_router = Arc::new(aegis_shard::ShardRouter::new(shard_store));
        let refresh_rotator = Arc::new(aegis_actors::RefreshRotator::new());
        let revocation_index = Arc::new(aegis_actors::RevocationIndex::new());
        let tokens = Arc::new(TokenService::new(
            "https://issuer.example",
            Arc::clone(&keyring),
            shard_router,
            refresh_rotator,
            revocation_index,
            aegis_tokens::service::IntrospectionCacheConfig::default(),
        ));
        AuthorizeEngine::new(
            Arc::new(FakeRegistry(vec![confidential_client()])),
            Arc::new(CodeStore::new()),
            Arc::new(ParStore::new()),
            tokens,
            keyring,
            None,
            None,
            "https://issuer.example",
            300,
            3600,
        )
    }

    #[test]
    fn post_redirect_failure_for_code_only_uses_query_not_fragment() {
        let engine = engine();
        let mut request = base_request();
        request.scope = String::new();
        match engine.begin(request) {
            Err(AuthorizeError::Redirect(RedirectTarget::Redirect(url))) => {
                assert!(url.contains('?'), "expected query-string redirect, got {url}");
                assert!(!url.contains('#'), "code-only response_mode must not use fragment, got {url}");
            }
            Err(AuthorizeError::Direct(_)) => panic!("expected a redirect error, got a direct 400"),
            Err(AuthorizeError::Redirect(RedirectTarget::FormPost { .. })) => {
                panic!("expected a plain redirect, got a form_post target")
            }
            Ok(_) => panic!("expected validation to fail on empty scope"),
        }
    }

    #[tokio::test]
    async fn exchange_code_mints_access_and_refresh_tokens() {
        let engine = engine();
        let code = engine
            .codes
            .mint("client-1", "https://rp.example/cb", "read", "user-1", None, None, None, vec![], 0, 300)
            .unwrap();

        let tokens = engine
            .exchange_code(&code, "client-1", "https://rp.example/cb", None, AccessTokenKind::Opaque, None, true)
            .await
            .unwrap();

        assert!(!tokens.access_token.is_empty());
        assert!(tokens.refresh_token.is_some());
        assert!(tokens.id_token.is_none(), "no openid scope was requested");
        assert_eq!(tokens.scope, "read");
    }

    #[tokio::test]
    async fn exchange_code_rejects_reused_code() {
        let engine = engine();
        let code = engine
            .codes
            .mint("client-1", "https://rp.example/cb", "read", "user-1", None, None, None, vec![], 0, 300)
            .unwrap();

        engine
            .exchange_code(&code, "client-1", "https://rp.example/cb", None, AccessTokenKind::Opaque, None, false)
            .await
            .unwrap();
        let replay = engine
            .exchange_code(&code, "client-1", "https://rp.example/cb", None, AccessTokenKind::Opaque, None, false)
            .await;
        assert!(replay.is_err());
    }

    #[tokio::test]
    async fn push_par_then_resolve_request_round_trips() {
        let engine = engine();
        let request_uri = engine.push_par(base_request(), 60).unwrap();
        assert!(request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));

        let thin_request = AuthorizationRequest { pkce: None, ..base_request() };
        let resolved = engine.resolve_request(thin_request, Some(request_uri)).await.unwrap();
        assert_eq!(resolved.scope, "read");
    }

    #[tokio::test]
    async fn resolve_request_without_request_uri_or_jar_is_passthrough() {
        let engine = engine();
        let resolved = engine.resolve_request(base_request(), None).await.unwrap();
        assert_eq!(resolved.client_id, "client-1");
    }

    #[tokio::test]
    async fn resolve_request_with_request_object_and_no_jwks_lookup_errors() {
        let engine = engine();
        let mut request = base_request();
        request.request_jwt = Some("header.payload.signature".to_string());
        assert!(engine.resolve_request(request, None).await.is_err());
    }
}
