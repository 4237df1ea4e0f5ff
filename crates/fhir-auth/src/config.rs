//! Static authentication configuration
//!
//! Read once at construction. The service builds this from its TOML file;
//! the client secret is resolved from the environment or a secret file and
//! never comes from the TOML itself.

use common::Secret;

use crate::constants::DEFAULT_SIGN_IN_PATH;

/// Where and as whom the manager authenticates.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: String,
    pub scope: String,
    /// Sent as the `audience` authorization parameter when set.
    pub audience: Option<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    /// API origin, e.g. `https://api.example.com`. Sign-in lives under it.
    pub api_base: String,
    pub sign_in_path: String,
}

impl AuthConfig {
    /// Config with the given client id and endpoints; everything else empty
    /// or defaulted.
    pub fn new(
        client_id: impl Into<String>,
        authorize_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: String::new(),
            scope: String::new(),
            audience: None,
            authorize_endpoint: authorize_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            api_base: api_base.into(),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
        }
    }

    /// Full URL of the vendor sign-in endpoint.
    pub fn sign_in_url(&self) -> String {
        join_url(&self.api_base, &self.sign_in_path)
    }

    /// Client secret as a form value, if configured.
    pub(crate) fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_ref().map(|s| s.expose().as_str())
    }
}

/// Join an origin and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_url_joins_origin_and_path() {
        let config = AuthConfig::new(
            "client",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
            "https://api.example.com/",
        );
        assert_eq!(config.sign_in_url(), "https://api.example.com/auth/sign-in");
    }

    #[test]
    fn join_url_handles_missing_slash() {
        assert_eq!(join_url("https://a.test", "sources"), "https://a.test/sources");
        assert_eq!(join_url("https://a.test/", "/sources"), "https://a.test/sources");
        assert_eq!(join_url("https://a.test", ""), "https://a.test");
    }

    #[test]
    fn client_secret_is_optional() {
        let mut config = AuthConfig::new("c", "a", "t", "b");
        assert!(config.client_secret().is_none());
        config.client_secret = Some(Secret::from("shh"));
        assert_eq!(config.client_secret(), Some("shh"));
        assert!(!format!("{config:?}").contains("shh"));
    }
}
