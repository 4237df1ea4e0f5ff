//! Authorization-code redirect construction
//!
//! Builds the URL a user opens in a browser to start the authorization-code
//! flow, and generates the opaque `state` value the authorization server
//! echoes back for CSRF protection.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use reqwest::Url;

use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Generate a random anti-forgery `state` value (32 bytes, URL-safe base64).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL from the configured endpoint.
///
/// Appends `response_type=code`, `client_id`, `redirect_uri`, `scope`, and
/// `audience` / `state` when present. Existing query parameters on the
/// endpoint are kept.
pub fn build_authorization_url(config: &AuthConfig, state: Option<&str>) -> Result<Url> {
    let mut params = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", config.scope.as_str()),
    ];
    if let Some(audience) = config.audience.as_deref() {
        params.push(("audience", audience));
    }
    if let Some(state) = state {
        params.push(("state", state));
    }

    Url::parse_with_params(&config.authorize_endpoint, &params).map_err(|e| {
        Error::InvalidEndpoint(format!(
            "authorize_endpoint {:?}: {e}",
            config.authorize_endpoint
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::new(
            "client-1",
            "https://auth.example.com/authorize",
            "https://auth.example.com/oauth/token",
            "https://api.example.com",
        );
        config.redirect_uri = "http://localhost:3000/callback".into();
        config.scope = "openid offline_access".into();
        config
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn url_carries_required_params() {
        let url = build_authorization_url(&test_config(), None).unwrap();
        assert!(url.as_str().starts_with("https://auth.example.com/authorize?"));

        let query = query_map(&url);
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(query["scope"], "openid offline_access");
        assert!(!query.contains_key("state"));
        assert!(!query.contains_key("audience"));
    }

    #[test]
    fn url_includes_state_and_audience_when_given() {
        let mut config = test_config();
        config.audience = Some("https://api.example.com".into());
        let url = build_authorization_url(&config, Some("xyz")).unwrap();

        let query = query_map(&url);
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["audience"], "https://api.example.com");
    }

    #[test]
    fn special_characters_are_encoded() {
        let url = build_authorization_url(&test_config(), None).unwrap();
        assert!(url.as_str().contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(!url.as_str().contains("openid offline_access"));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let mut config = test_config();
        config.authorize_endpoint = "not a url".into();
        assert!(matches!(
            build_authorization_url(&config, None),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe base64: {a}"
        );
        assert_ne!(a, b);
    }
}
