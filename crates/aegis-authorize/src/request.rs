//! Authorization request shape (`spec.md` §2: `AuthorizationRequest`).

use serde::{Deserialize, Serialize};

/// `response_type` values this provider supports, as the six combinations
/// permitted by OAuth 2.0 Multiple Response Type Encoding Practices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
    Token,
    IdToken,
    CodeIdToken,
    CodeToken,
    IdTokenToken,
    CodeIdTokenToken,
}

impl ResponseType {
    /// Parse the space-separated `response_type` query parameter. Order of
    /// the space-separated values doesn't matter per the spec it implements.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts: Vec<&str> = value.split_whitespace().collect();
        parts.sort_unstable();
        match parts.as_slice() {
            ["code"] => Some(Self::Code),
            ["token"] => Some(Self::Token),
            ["id_token"] => Some(Self::IdToken),
            ["code", "id_token"] => Some(Self::CodeIdToken),
            ["code", "token"] => Some(Self::CodeToken),
            ["id_token", "token"] => Some(Self::IdTokenToken),
            ["code", "id_token", "token"] => Some(Self::CodeIdTokenToken),
            _ => None,
        }
    }

    #[must_use]
    pub fn includes_code(self) -> bool {
        matches!(self, Self::Code | Self::CodeIdToken | Self::CodeToken | Self::CodeIdTokenToken)
    }

    #[must_use]
    pub fn includes_token(self) -> bool {
        matches!(self, Self::Token | Self::CodeToken | Self::IdTokenToken | Self::CodeIdTokenToken)
    }

    #[must_use]
    pub fn includes_id_token(self) -> bool {
        matches!(self, Self::IdToken | Self::CodeIdToken | Self::IdTokenToken | Self::CodeIdTokenToken)
    }

    /// Whether `nonce` is mandatory for this response type (any response
    /// type containing `id_token` or `token`, per `spec.md` §2).
    #[must_use]
    pub fn requires_nonce(self) -> bool {
        self.includes_id_token() || self.includes_token()
    }

    /// Whether this is the pure-`code` response type, which forbids
    /// `response_mode=fragment` (`spec.md` §2, §4.K).
    #[must_use]
    pub fn is_code_only(self) -> bool {
        matches!(self, Self::Code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Query,
    Fragment,
    FormPost,
}

impl ResponseMode {
    /// `spec.md` §4.K step 7: `query` for pure code, `fragment` otherwise.
    #[must_use]
    pub fn default_for(response_type: ResponseType) -> Self {
        if response_type.is_code_only() {
            Self::Query
        } else {
            Self::Fragment
        }
    }

    /// Best-effort response_mode for a redirect carrying a *validation
    /// failure*, computed the same way a successful request would
    /// (explicit `response_mode` wins, else the response_type's default)
    /// so an error redirect never lands in the wrong part of the URI
    /// just because validation failed before `response_mode` was fully
    /// resolved. Falls back to `fragment` only when `response_type`
    /// itself doesn't parse, since no narrower default can be derived.
    #[must_use]
    pub fn effective_for_error(request: &AuthorizationRequest) -> Self {
        match request.response_mode.as_deref() {
            Some("query") => return Self::Query,
            Some("fragment") => return Self::Fragment,
            Some("form_post") => return Self::FormPost,
            _ => {}
        }
        match ResponseType::parse(&request.response_type) {
            Some(response_type) => Self::default_for(response_type),
            None => Self::Fragment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceParams {
    pub code_challenge: String,
    pub code_challenge_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce: Option<PkceParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_locales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_jwt: Option<String>,
}

impl AuthorizationRequest {
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    #[must_use]
    pub fn wants_openid(&self) -> bool {
        self.scopes().contains(&"openid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unordered_response_type() {
        assert_eq!(ResponseType::parse("token id_token"), Some(ResponseType::IdTokenToken));
        assert_eq!(ResponseType::parse("code"), Some(ResponseType::Code));
        assert_eq!(ResponseType::parse("bogus"), None);
    }

    #[test]
    fn nonce_requirement_matches_response_type() {
        assert!(!ResponseType::Code.requires_nonce());
        assert!(ResponseType::CodeIdToken.requires_nonce());
        assert!(ResponseType::Token.requires_nonce());
    }

    #[test]
    fn default_response_mode() {
        assert_eq!(ResponseMode::default_for(ResponseType::Code), ResponseMode::Query);
        assert_eq!(ResponseMode::default_for(ResponseType::CodeIdToken), ResponseMode::Fragment);
    }
}
