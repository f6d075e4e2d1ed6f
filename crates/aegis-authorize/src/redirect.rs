//! Builds the caller-facing redirect for both success and
//! post-validation-failure outcomes, per the request's selected
//! [`ResponseMode`].

use std::fmt::Write as _;

use aegis_core::OpError;

use crate::request::ResponseMode;

/// Everything the transport layer (out of scope here, per `spec.md` §1)
/// needs to render a response: either a 3xx redirect with the params
/// folded into the query/fragment, or an auto-submitting HTML form.
#[derive(Debug, Clone)]
pub enum RedirectTarget {
    Redirect(String),
    FormPost { action: String, fields: Vec<(String, String)> },
}

impl RedirectTarget {
    #[must_use]
    pub fn build(redirect_uri: &str, mode: ResponseMode, params: Vec<(String, String)>) -> Self {
        match mode {
            ResponseMode::Query => Self::Redirect(append(redirect_uri, '?', &params)),
            ResponseMode::Fragment => Self::Redirect(append(redirect_uri, '#', &params)),
            ResponseMode::FormPost => Self::FormPost { action: redirect_uri.to_string(), fields: params },
        }
    }

    /// Render a `form_post` target as the minimal auto-submitting HTML
    /// document OpenID Connect's `form_post` response mode expects.
    /// Returns `None` for the `Redirect` variant.
    #[must_use]
    pub fn to_html(&self) -> Option<String> {
        let Self::FormPost { action, fields } = self else { return None };
        let mut body = String::new();
        write!(body, "<html><head><title>Submit</title></head><body onload=\"document.forms[0].submit()\">").ok()?;
        write!(body, "<form method=\"post\" action=\"{}\">", html_escape(action)).ok()?;
        for (key, value) in fields {
            write!(
                body,
                "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                html_escape(key),
                html_escape(value)
            )
            .ok()?;
        }
        body.push_str("</form></body></html>");
        Some(body)
    }
}

fn append(base: &str, separator: char, params: &[(String, String)]) -> String {
    let mut url = base.to_string();
    url.push(separator);
    let encoded: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
        .collect();
    url.push_str(&encoded.join("&"));
    url
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn html_escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Fold an [`OpError`] into the `error`/`error_description`/`state`
/// triple `spec.md` §4.K requires for every post-validation failure.
#[must_use]
pub fn error_params(error: &OpError, state: Option<&str>) -> Vec<(String, String)> {
    let mut params = vec![
        ("error".to_string(), error.kind.oauth_error_code().to_string()),
        ("error_description".to_string(), error.client_safe_message()),
    ];
    if let Some(state) = state {
        params.push(("state".to_string(), state.to_string()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_mode_appends_with_question_mark() {
        let target = RedirectTarget::build(
            "https://rp.example/cb",
            ResponseMode::Query,
            vec![("code".to_string(), "abc".to_string())],
        );
        match target {
            RedirectTarget::Redirect(url) => assert_eq!(url, "https://rp.example/cb?code=abc"),
            RedirectTarget::FormPost { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn fragment_mode_appends_with_hash() {
        let target = RedirectTarget::build(
            "https://rp.example/cb",
            ResponseMode::Fragment,
            vec![("access_token".to_string(), "tok".to_string())],
        );
        match target {
            RedirectTarget::Redirect(url) => assert_eq!(url, "https://rp.example/cb#access_token=tok"),
            RedirectTarget::FormPost { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn form_post_renders_autosubmitting_form() {
        let target = RedirectTarget::build(
            "https://rp.example/cb",
            ResponseMode::FormPost,
            vec![("code".to_string(), "abc".to_string())],
        );
        let html = target.to_html().unwrap();
        assert!(html.contains("document.forms[0].submit()"));
        assert!(html.contains("name=\"code\" value=\"abc\""));
    }

    #[test]
    fn error_params_include_state_when_present() {
        let err = OpError::invalid_scope("bad scope");
        let params = error_params(&err, Some("xyz"));
        assert!(params.iter().any(|(k, v)| k == "error" && v == "invalid_scope"));
        assert!(params.iter().any(|(k, v)| k == "state" && v == "xyz"));
    }
}
