//! `grant_type` identifiers accepted at the `/token` endpoint (`spec.md`
//! §6). Kept separate from [`crate::service`] so the wire-level grant
//! vocabulary doesn't get tangled with the minting primitives it dispatches
//! to.

/// The `grant_type` values this provider's token endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    DeviceCode,
    Ciba,
    TokenExchange,
}

impl GrantType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
            Self::Ciba => "urn:openid:params:grant-type:ciba",
            Self::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            "urn:ietf:params:oauth:grant-type:device_code" => Some(Self::DeviceCode),
            "urn:openid:params:grant-type:ciba" => Some(Self::Ciba),
            "urn:ietf:params:oauth:grant-type:token-exchange" => Some(Self::TokenExchange),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_grant_type() {
        for gt in [
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
            GrantType::DeviceCode,
            GrantType::Ciba,
            GrantType::TokenExchange,
        ] {
            assert_eq!(GrantType::parse(gt.as_str()), Some(gt));
        }
    }

    #[test]
    fn rejects_unknown_grant_type() {
        assert_eq!(GrantType::parse("bogus"), None);
    }
}
