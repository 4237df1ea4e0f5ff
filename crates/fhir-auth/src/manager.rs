//! Credential manager
//!
//! Owns the process's single credential. Every acquisition path installs
//! the new credential in memory and mirrors it to the token store; every
//! read goes through `current_access_token()`, which refreshes a credential
//! within five minutes of expiry before handing the token out.
//!
//! The lock only guards snapshot and replace; it is never held across a
//! network call. Two reads racing on a near-expiry credential may both
//! refresh, and whichever response lands last wins.

use std::sync::Arc;

use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::authorize::build_authorization_url;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::credentials::{Credential, TokenStore};
use crate::error::{Error, Result};
use crate::token;

/// Single-credential manager.
///
/// Construct one per process and share it (`Arc<CredentialManager>`) with
/// everything that makes authenticated calls.
pub struct CredentialManager {
    config: AuthConfig,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    store: Option<TokenStore>,
    credential: RwLock<Option<Credential>>,
}

impl CredentialManager {
    /// In-memory manager on the system clock. Nothing is persisted until a
    /// store is attached with `with_store`.
    pub fn new(config: AuthConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            clock: Arc::new(SystemClock),
            store: None,
            credential: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a token store and restore whatever credential it holds.
    ///
    /// An unreadable or corrupt file leaves the manager unauthenticated.
    pub async fn with_store(mut self, store: TokenStore) -> Self {
        let restored = match store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "ignoring unreadable token file");
                None
            }
        };
        if restored.is_some() {
            info!(path = %store.path().display(), "restored persisted credential");
        }
        *self.credential.get_mut() = restored;
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// HTTP client shared with the gateway.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn token_store(&self) -> Option<&TokenStore> {
        self.store.as_ref()
    }

    /// Redirect URL for the interactive authorization-code flow.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url> {
        build_authorization_url(&self.config, state)
    }

    /// Exchange an authorization code and install the resulting credential.
    ///
    /// The live credential is untouched if the exchange fails.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let response = token::exchange_code(&self.client, &self.config, code).await?;
        let credential = Credential::from_token_response(response, self.clock.now_millis());
        self.install(credential.clone()).await;
        info!("authorization code exchanged");
        Ok(credential)
    }

    /// Refresh with the given refresh token, or the live credential's.
    ///
    /// Fails with `NoRefreshToken` before any network call if neither exists.
    /// A response without a new refresh token keeps the one just used.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<Credential> {
        let refresh = match refresh_token {
            Some(token) => token.to_owned(),
            None => self
                .credential
                .read()
                .await
                .as_ref()
                .and_then(|c| c.refresh_token.clone())
                .ok_or(Error::NoRefreshToken)?,
        };

        let response = token::refresh_token(&self.client, &self.config, &refresh).await?;
        let mut credential = Credential::from_token_response(response, self.clock.now_millis());
        if credential.refresh_token.is_none() {
            credential.refresh_token = Some(refresh);
        }
        self.install(credential.clone()).await;
        info!("access token refreshed");
        Ok(credential)
    }

    /// Sign in against the vendor endpoint and install the credential.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Credential> {
        let response = token::sign_in(&self.client, &self.config, username, password).await?;
        let credential = response.into_credential(self.clock.now_millis())?;
        self.install(credential.clone()).await;
        info!("signed in");
        Ok(credential)
    }

    /// The bearer token to attach to the next request.
    ///
    /// Refreshes first when the credential is within five minutes of expiry;
    /// a credential without expiry information is returned as is.
    pub async fn current_access_token(&self) -> Result<String> {
        let credential = self
            .credential
            .read()
            .await
            .clone()
            .ok_or(Error::NoCredential)?;

        if !credential.needs_refresh(self.clock.now_millis()) {
            return Ok(credential.access_token);
        }

        debug!("access token near expiry, refreshing before use");
        let refresh = credential
            .refresh_token
            .as_deref()
            .ok_or(Error::NoRefreshToken)?;
        let refreshed = self.refresh(Some(refresh)).await?;
        Ok(refreshed.access_token)
    }

    /// Replace the access token value with one obtained out of band.
    ///
    /// Other metadata on a live credential is kept; with no live credential
    /// a bare one (no expiry, no refresh token) is created. Not persisted;
    /// follow with `persist()` to write it out.
    pub async fn set_access_token(&self, access_token: impl Into<String>) {
        let access_token = access_token.into();
        let mut guard = self.credential.write().await;
        match guard.as_mut() {
            Some(credential) => credential.access_token = access_token,
            None => *guard = Some(Credential::manual(access_token, self.clock.now_millis())),
        }
        debug!("access token set manually");
    }

    /// Write the live credential to the token store.
    ///
    /// A manager without a store treats this as a no-op.
    pub async fn persist(&self) -> Result<()> {
        let credential = self
            .credential
            .read()
            .await
            .clone()
            .ok_or(Error::NoCredential)?;
        match &self.store {
            Some(store) => store.save(&credential).await,
            None => {
                debug!("no token store configured, credential kept in memory only");
                Ok(())
            }
        }
    }

    /// Drop the live credential and delete the token file.
    ///
    /// File errors are logged and swallowed.
    pub async fn clear_token(&self) {
        self.credential.write().await.take();
        if let Some(store) = &self.store
            && let Err(e) = store.delete().await
        {
            warn!(path = %store.path().display(), error = %e, "failed to delete token file");
        }
        info!("credential cleared");
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Snapshot of the live credential.
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    /// Install a freshly acquired credential and mirror it to disk.
    async fn install(&self, credential: Credential) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(&credential).await
        {
            warn!(path = %store.path().display(), error = %e, "failed to persist credential, keeping it in memory");
        }
        *self.credential.write().await = Some(credential);
    }
}
