//! Unified error type for the Aegis identity provider.
//!
//! Every crate in this workspace returns [`OpError`] so that callers at the
//! transport boundary (out of scope for this repo — see `spec.md` §1) can
//! make one decision about status code / redirect vs. direct response
//! without depending on a dozen leaf error enums.

use std::fmt;

/// Result type alias used throughout the workspace.
pub type OpResult<T> = std::result::Result<T, OpError>;

/// Error classification.
///
/// Variants map 1:1 onto the taxonomy in `spec.md` §7: OAuth/OIDC
/// protocol error codes, validation errors, conflicts, not-found/
/// forbidden/unauthorized, server errors, and unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpErrorKind {
    // --- OAuth / OIDC protocol error codes (RFC 6749 §5.2, RFC 8628, RFC 9449) ---
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    InteractionRequired,
    LoginRequired,
    ConsentRequired,
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
    InvalidDpopProof,
    InvalidTarget,

    // --- Validation ---
    ValidationRequiredField,
    ValidationInvalidValue,

    // --- Resource state ---
    Conflict,
    NotFound,
    Forbidden,
    Unauthorized,

    // --- Operational ---
    ServerError,
    TemporarilyUnavailable,
}

impl OpErrorKind {
    /// The wire-level OAuth/OIDC `error` string for this kind, where one
    /// is defined by the relevant RFC. Kinds with no RFC string (e.g.
    /// `ValidationRequiredField`) fall back to `invalid_request`.
    #[must_use]
    pub const fn oauth_error_code(self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::ValidationRequiredField
            | Self::ValidationInvalidValue => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::InteractionRequired => "interaction_required",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::AccessDenied => "access_denied",
            Self::InvalidDpopProof => "invalid_dpop_proof",
            Self::InvalidTarget => "invalid_target",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// The HTTP status a transport adapter should map this kind to.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnsupportedGrantType
            | Self::UnsupportedResponseType
            | Self::InvalidScope
            | Self::InvalidTarget
            | Self::ValidationRequiredField
            | Self::ValidationInvalidValue
            | Self::AccessDenied
            | Self::InvalidDpopProof => 400,
            Self::Unauthorized | Self::InvalidClient => 401,
            Self::Forbidden | Self::UnauthorizedClient => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InteractionRequired
            | Self::LoginRequired
            | Self::ConsentRequired
            | Self::AuthorizationPending
            | Self::SlowDown
            | Self::ExpiredToken => 400,
            Self::ServerError => 500,
            Self::TemporarilyUnavailable => 503,
        }
    }

    /// Whether an operation that failed with this kind is safe to retry.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TemporarilyUnavailable | Self::ServerError)
    }
}

/// The workspace-wide error type.
#[derive(Debug, Clone)]
pub struct OpError {
    /// Error classification.
    pub kind: OpErrorKind,
    /// Human-readable message. Never echoed verbatim to clients for
    /// `ServerError` — callers should use [`OpError::client_safe_message`].
    pub message: String,
    /// Optional context: which component raised the error.
    pub component: Option<&'static str>,
}

impl OpError {
    /// Construct a new error.
    #[must_use]
    pub fn new(kind: OpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            component: None,
        }
    }

    /// Attach the component name that raised this error.
    #[must_use]
    pub fn with_component(mut self, component: &'static str) -> Self {
        self.component = Some(component);
        self
    }

    /// Message safe to return to a relying party: server errors never leak
    /// internal detail, per `spec.md` §7 ("never disclose internals").
    #[must_use]
    pub fn client_safe_message(&self) -> String {
        match self.kind {
            OpErrorKind::ServerError => "An internal error occurred".to_string(),
            OpErrorKind::TemporarilyUnavailable => {
                "The service is temporarily unavailable".to_string()
            }
            _ => self.message.clone(),
        }
    }

    /// Whether this error is safe to retry transparently.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::InvalidRequest, message)
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::InvalidGrant, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::Conflict, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::ServerError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::TemporarilyUnavailable, message)
    }

    pub fn invalid_dpop_proof(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::InvalidDpopProof, message)
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::InvalidScope, message)
    }

    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::UnauthorizedClient, message)
    }

    pub fn unsupported_response_type(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::UnsupportedResponseType, message)
    }

    pub fn unsupported_grant_type(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::UnsupportedGrantType, message)
    }

    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::InvalidClient, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::Forbidden, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(OpErrorKind::Unauthorized, message)
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.oauth_error_code(), self.message)?;
        if let Some(component) = self.component {
            write!(f, " (component: {component})")?;
        }
        Ok(())
    }
}

impl std::error::Error for OpError {}

impl From<serde_json::Error> for OpError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(OpErrorKind::ServerError, format!("json error: {err}"))
    }
}
