//! RFC 8693 token exchange (`spec.md` §4.I): map `subject_token` to a
//! user, enforce the presenting client's exchange policy, and issue a new
//! access token carrying a delegation/impersonation `act` claim chain.

use aegis_core::{OpError, OpResult};
use serde::{Deserialize, Serialize};

/// `urn:ietf:params:oauth:token-type:*` identifiers this service accepts
/// as `subject_token_type`/`requested_token_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    AccessToken,
    RefreshToken,
    IdToken,
    Jwt,
}

impl TokenType {
    #[must_use]
    pub fn as_urn(self) -> &'static str {
        match self {
            Self::AccessToken => "urn:ietf:params:oauth:token-type:access_token",
            Self::RefreshToken => "urn:ietf:params:oauth:token-type:refresh_token",
            Self::IdToken => "urn:ietf:params:oauth:token-type:id_token",
            Self::Jwt => "urn:ietf:params:oauth:token-type:jwt",
        }
    }

    pub fn parse(value: &str) -> OpResult<Self> {
        match value {
            "urn:ietf:params:oauth:token-type:access_token" => Ok(Self::AccessToken),
            "urn:ietf:params:oauth:token-type:refresh_token" => Ok(Self::RefreshToken),
            "urn:ietf:params:oauth:token-type:id_token" => Ok(Self::IdToken),
            "urn:ietf:params:oauth:token-type:jwt" => Ok(Self::Jwt),
            other => Err(OpError::invalid_request(format!("unsupported token type: {other}"))),
        }
    }
}

/// A single hop in the `act` (actor) delegation chain, per RFC 8693 §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaim {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act: Option<Box<ActorClaim>>,
}

/// Per-client policy governing which exchanges are permitted: the set of
/// `subject_token_type`s it may present and whether it may request
/// impersonation (same subject, new audience) versus delegation (an
/// `act` chain naming the exchanging client as actor).
#[derive(Debug, Clone)]
pub struct ExchangePolicy {
    pub allowed_subject_token_types: Vec<TokenType>,
    pub allow_delegation: bool,
    pub allow_impersonation: bool,
}

#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub subject_token: String,
    pub subject_token_type: TokenType,
    pub requested_token_type: TokenType,
    pub scope: Option<String>,
    pub resource: Option<String>,
    pub actor_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExchangeDecision {
    pub subject: String,
    pub scope: String,
    pub act: Option<serde_json::Value>,
}

/// Validate an exchange request against `policy` and the subject resolved
/// from `subject_token`'s claims. `original_subject`/`original_scope` and
/// `actor_subject` (when `request.actor_token` is present) must already be
/// verified by the caller — in practice via
/// [`crate::service::TokenService::introspect`] — before reaching this
/// function; it never looks at the raw token strings itself.
///
/// # Errors
/// Returns `invalid_request` if the subject token type isn't permitted
/// for this client, `invalid_target` if the requested token type isn't
/// one this service mints via exchange, `invalid_scope` if the
/// requested scope isn't a subset of the original grant's scope (token
/// exchange can only narrow scope, never widen it), and `invalid_grant`
/// if `actor_token` was presented but `actor_subject` couldn't be
/// resolved by the caller.
pub fn evaluate(
    request: &ExchangeRequest,
    policy: &ExchangePolicy,
    original_subject: &str,
    original_scope: &str,
    actor_subject: Option<&str>,
) -> OpResult<ExchangeDecision> {
    if !policy.allowed_subject_token_types.contains(&request.subject_token_type) {
        return Err(OpError::invalid_request(format!(
            "client is not permitted to exchange a {:?} subject token",
            request.subject_token_type
        )));
    }
    if !matches!(request.requested_token_type, TokenType::AccessToken | TokenType::Jwt) {
        return Err(OpError::new(
            aegis_core::OpErrorKind::InvalidTarget,
            "only access_token/jwt requested_token_type is supported",
        ));
    }

    let requested_scopes: Vec<&str> = request.scope.as_deref().unwrap_or(original_scope).split_whitespace().collect();
    let granted_scopes: Vec<&str> = original_scope.split_whitespace().collect();
    if !requested_scopes.iter().all(|s| granted_scopes.contains(s)) {
        return Err(OpError::invalid_scope("requested scope exceeds original grant"));
    }

    let act = if request.actor_token.is_some() {
        if !policy.allow_delegation {
            return Err(OpError::unauthorized_client("client is not permitted to request delegation"));
        }
        let actor_subject = actor_subject
            .ok_or_else(|| OpError::invalid_grant("actor_token could not be resolved to a verified subject"))?;
        Some(serde_json::json!({ "sub": actor_subject }))
    } else if policy.allow_impersonation {
        None
    } else {
        return Err(OpError::unauthorized_client("client is not permitted to impersonate without an actor_token"));
    };

    Ok(ExchangeDecision {
        subject: original_subject.to_string(),
        scope: requested_scopes.join(" "),
        act,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ExchangePolicy {
        ExchangePolicy {
            allowed_subject_token_types: vec![TokenType::AccessToken],
            allow_delegation: true,
            allow_impersonation: true,
        }
    }

    fn request() -> ExchangeRequest {
        ExchangeRequest {
            subject_token: "tok".to_string(),
            subject_token_type: TokenType::AccessToken,
            requested_token_type: TokenType::AccessToken,
            scope: Some("read".to_string()),
            resource: None,
            actor_token: None,
        }
    }

    #[test]
    fn narrows_scope_successfully() {
        let decision = evaluate(&request(), &policy(), "user-1", "read write", None).unwrap();
        assert_eq!(decision.scope, "read");
        assert!(decision.act.is_none());
    }

    #[test]
    fn rejects_scope_widening() {
        let mut req = request();
        req.scope = Some("admin".to_string());
        assert!(evaluate(&req, &policy(), "user-1", "read", None).is_err());
    }

    #[test]
    fn rejects_disallowed_subject_token_type() {
        let mut req = request();
        req.subject_token_type = TokenType::RefreshToken;
        assert!(evaluate(&req, &policy(), "user-1", "read", None).is_err());
    }

    #[test]
    fn delegation_requires_policy_allowance() {
        let mut req = request();
        req.actor_token = Some("actor-tok".to_string());
        let mut pol = policy();
        pol.allow_delegation = false;
        assert!(evaluate(&req, &pol, "user-1", "read", Some("actor-sub")).is_err());
    }

    #[test]
    fn delegation_sets_act_claim() {
        let mut req = request();
        req.actor_token = Some("actor-tok-value".to_string());
        let decision = evaluate(&req, &policy(), "user-1", "read", Some("actor-sub")).unwrap();
        assert_eq!(decision.act.unwrap()["sub"], "actor-sub");
    }

    #[test]
    fn delegation_without_resolved_actor_subject_is_rejected() {
        let mut req = request();
        req.actor_token = Some("actor-tok-value".to_string());
        assert!(evaluate(&req, &policy(), "user-1", "read", None).is_err());
    }
}
