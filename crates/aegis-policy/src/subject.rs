//! Pairwise subject derivation (`spec.md` §4.P):
//! `sub = base64url(SHA-256(sector_identifier_host ‖ local_account_id ‖ salt))`.

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::PolicyError;

/// Derive the stable pairwise `sub` for `local_account_id` under
/// `sector_host`. Deterministic: same inputs always produce the same
/// subject, which is the whole point — a client sees a stable-but-
/// unlinkable identifier across sessions.
#[must_use]
pub fn derive_pairwise_subject(sector_host: &str, local_account_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sector_host.as_bytes());
    hasher.update(local_account_id.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Resolve the sector host to derive a pairwise subject under: the
/// single redirect host when there's only one, or the host of a
/// `sector_identifier_uri` fetched and validated to cover every
/// registered redirect host.
///
/// # Errors
/// Returns [`PolicyError::SectorIdentifierFetch`] on transport/decode
/// failure and [`PolicyError::SectorIdentifierIncomplete`] if the
/// fetched list omits a registered redirect host.
pub async fn resolve_sector_host(
    http: &reqwest::Client,
    sector_identifier_uri: Option<&str>,
    redirect_uris: &[String],
) -> Result<String, PolicyError> {
    let hosts = redirect_hosts(redirect_uris);

    let Some(uri) = sector_identifier_uri else {
        return hosts.into_iter().next().ok_or_else(|| {
            PolicyError::SectorIdentifierIncomplete("client has no redirect_uris".to_string())
        });
    };

    let response = http
        .get(uri)
        .send()
        .await
        .map_err(|e| PolicyError::SectorIdentifierFetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(PolicyError::SectorIdentifierFetch(format!(
            "sector_identifier_uri returned {}",
            response.status()
        )));
    }
    let listed: Vec<String> = response
        .json()
        .await
        .map_err(|e| PolicyError::SectorIdentifierFetch(e.to_string()))?;

    for host in &hosts {
        let covered = listed.iter().any(|entry| {
            url::Url::parse(entry).ok().and_then(|u| u.host_str().map(ToString::to_string)).as_deref()
                == Some(host.as_str())
        });
        if !covered {
            return Err(PolicyError::SectorIdentifierIncomplete(host.clone()));
        }
    }

    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .ok_or_else(|| PolicyError::SectorIdentifierFetch("sector_identifier_uri has no host".to_string()))
}

fn redirect_hosts(redirect_uris: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for uri in redirect_uris {
        if let Some(host) = url::Url::parse(uri).ok().and_then(|u| u.host_str().map(ToString::to_string)) {
            if !seen.contains(&host) {
                seen.push(host);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_pairwise_subject("rp.example", "user-1", "salt-abc");
        let b = derive_pairwise_subject("rp.example", "user-1", "salt-abc");
        assert_eq!(a, b);
    }

    #[test]
    fn different_sectors_yield_different_subjects() {
        let a = derive_pairwise_subject("rp-a.example", "user-1", "salt-abc");
        let b = derive_pairwise_subject("rp-b.example", "user-1", "salt-abc");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn single_redirect_host_needs_no_sector_uri() {
        let http = reqwest::Client::new();
        let uris = vec!["https://app.example/cb".to_string()];
        let host = resolve_sector_host(&http, None, &uris).await.unwrap();
        assert_eq!(host, "app.example");
    }

    #[tokio::test]
    async fn missing_sector_uri_with_multiple_hosts_errors() {
        let http = reqwest::Client::new();
        let uris = vec!["https://a.example/cb".to_string(), "https://b.example/cb".to_string()];
        assert!(resolve_sector_host(&http, None, &uris).await.is_err());
    }

    #[tokio::test]
    async fn sector_uri_covering_all_hosts_resolves() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sector.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                "https://a.example/cb",
                "https://b.example/cb"
            ])))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let uris = vec!["https://a.example/cb".to_string(), "https://b.example/cb".to_string()];
        let uri = format!("{}/sector.json", server.uri());
        let host = resolve_sector_host(&http, Some(&uri), &uris).await.unwrap();
        assert!(host.contains("127.0.0.1") || host.contains("localhost"));
    }

    #[tokio::test]
    async fn sector_uri_missing_a_host_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sector.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["https://a.example/cb"])))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let uris = vec!["https://a.example/cb".to_string(), "https://b.example/cb".to_string()];
        let uri = format!("{}/sector.json", server.uri());
        assert!(resolve_sector_host(&http, Some(&uri), &uris).await.is_err());
    }
}
