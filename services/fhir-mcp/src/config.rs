//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret is loaded from FHIR_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use fhir_auth::{AuthConfig, DEFAULT_SIGN_IN_PATH, TokenStore};
use fhir_gateway::{DEFAULT_PROBE_PATH, DEFAULT_QUERY_PATH};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "FHIR_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub token_store: TokenStoreConfig,
}

/// Upstream API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_query_path")]
    pub query_path: String,
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

/// OAuth client and endpoint settings
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to FHIR_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub audience: Option<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
}

/// Token persistence. Enabled by default: the token survives restarts as a
/// plain-text 0600 file. Set `enabled = false` to keep it in memory only.
#[derive(Debug, Deserialize)]
pub struct TokenStoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `~/.fhir-mcp/token.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_query_path() -> String {
    DEFAULT_QUERY_PATH.to_string()
}

fn default_probe_path() -> String {
    DEFAULT_PROBE_PATH.to_string()
}

fn default_sign_in_path() -> String {
    DEFAULT_SIGN_IN_PATH.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. FHIR_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oauth.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("api.base_url", &self.api.base_url),
            ("oauth.authorize_endpoint", &self.oauth.authorize_endpoint),
            ("oauth.token_endpoint", &self.oauth.token_endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("fhir-mcp.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Static auth settings for the credential manager.
    pub fn auth_config(&self) -> AuthConfig {
        let mut auth = AuthConfig::new(
            self.oauth.client_id.clone(),
            self.oauth.authorize_endpoint.clone(),
            self.oauth.token_endpoint.clone(),
            self.api.base_url.clone(),
        );
        auth.client_secret = self.oauth.client_secret.clone();
        auth.redirect_uri = self.oauth.redirect_uri.clone();
        auth.scope = self.oauth.scope.clone();
        auth.audience = self.oauth.audience.clone();
        auth.sign_in_path = self.oauth.sign_in_path.clone();
        auth
    }

    /// The token store to mirror the credential to, if persistence is on.
    pub fn token_store(&self) -> Option<TokenStore> {
        if !self.token_store.enabled {
            return None;
        }
        self.token_store
            .path
            .clone()
            .or_else(TokenStore::default_path)
            .map(TokenStore::new)
    }
}
