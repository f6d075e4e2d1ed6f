//! SSRF guard for the two outbound-HTTP seams this crate owns: upstream
//! discovery/JWKS fetch and authorization-code exchange. Both accept a
//! tenant-configured URL (provider discovery document, or a redirect
//! carrying a `code` back from a provider an admin registered), so a
//! misconfigured or malicious tenant must not be able to point the
//! provider at an internal address.

use std::net::IpAddr;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SsrfError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
    #[error("upstream url scheme must be https: {0}")]
    NonHttpsScheme(String),
    #[error("upstream url resolves to a disallowed address: {0}")]
    DisallowedAddress(String),
}

/// Reject anything other than `https` and any host that is a loopback,
/// link-local, private, or otherwise non-routable literal address.
/// Hostnames are allowed through (DNS resolution happens at request time,
/// outside this check) since a blanket hostname allowlist is a tenant
/// configuration concern, not something this crate can decide.
pub fn validate_upstream_url(raw: &str) -> Result<(), SsrfError> {
    let url = Url::parse(raw).map_err(|e| SsrfError::InvalidUrl(e.to_string()))?;

    if url.scheme() != "https" {
        return Err(SsrfError::NonHttpsScheme(raw.to_string()));
    }

    match url.host() {
        Some(url::Host::Ipv4(ip)) => reject_disallowed(IpAddr::V4(ip), raw),
        Some(url::Host::Ipv6(ip)) => reject_disallowed(IpAddr::V6(ip), raw),
        Some(url::Host::Domain(_)) | None => Ok(()),
    }
}

fn reject_disallowed(ip: IpAddr, raw: &str) -> Result<(), SsrfError> {
    let disallowed = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || is_unique_local(v6),
    };
    if disallowed {
        Err(SsrfError::DisallowedAddress(raw.to_string()))
    } else {
        Ok(())
    }
}

fn is_unique_local(ip: std::net::Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_https() {
        assert!(validate_upstream_url("http://idp.example/.well-known/openid-configuration").is_err());
    }

    #[test]
    fn rejects_loopback_literal() {
        assert!(validate_upstream_url("https://127.0.0.1/token").is_err());
    }

    #[test]
    fn rejects_private_ipv4_literal() {
        assert!(validate_upstream_url("https://10.0.0.5/token").is_err());
    }

    #[test]
    fn allows_public_hostname() {
        assert!(validate_upstream_url("https://idp.example.com/token").is_ok());
    }
}
