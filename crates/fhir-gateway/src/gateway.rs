//! Authenticated request gateway
//!
//! Attaches the manager's current bearer token to each call and classifies
//! the response. A 401 clears the credential so the next call fails fast
//! with `NoCredential` instead of replaying a token the API already refused.

use std::sync::Arc;
use std::time::Duration;

use fhir_auth::CredentialManager;
use fhir_auth::config::join_url;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::classify::{Outcome, classify_status};
use crate::error::{Error, Result};

/// Endpoint that executes structured query descriptors.
pub const DEFAULT_QUERY_PATH: &str = "/query";

/// Cheap authenticated endpoint used to test a token.
pub const DEFAULT_PROBE_PATH: &str = "/sources";

/// Upper bound on a single upstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Path-agnostic client for the API origin.
pub struct Gateway {
    manager: Arc<CredentialManager>,
    client: reqwest::Client,
    base_url: String,
    query_path: String,
    probe_path: String,
    timeout: Duration,
}

impl Gateway {
    /// Gateway for the manager's configured API origin, sharing its HTTP client.
    pub fn new(manager: Arc<CredentialManager>) -> Self {
        let base_url = manager.config().api_base.clone();
        let client = manager.http_client().clone();
        Self {
            manager,
            client,
            base_url,
            query_path: DEFAULT_QUERY_PATH.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_query_path(mut self, path: impl Into<String>) -> Self {
        self.query_path = path.into();
        self
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// Perform one authenticated call and return the JSON body verbatim.
    ///
    /// An empty success body (e.g. 204) yields `Value::Null`.
    #[instrument(skip(self, body))]
    pub async fn call(&self, path: &str, method: Method, body: Option<&Value>) -> Result<Value> {
        let token = self.manager.current_access_token().await?;
        let url = join_url(&self.base_url, path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&token)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, timeout = e.is_timeout(), "upstream request failed");
            Error::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        match classify_status(status) {
            Outcome::Success => {}
            Outcome::AuthenticationExpired => {
                warn!("upstream rejected the access token, clearing credential");
                self.manager.clear_token().await;
                return Err(Error::AuthenticationExpired);
            }
            Outcome::Failed => {
                debug!(status, "upstream returned error status");
                return Err(Error::RequestFailed { status });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Execute a structured query descriptor against the query endpoint.
    pub async fn query(&self, descriptor: &Value) -> Result<Value> {
        self.call(&self.query_path, Method::POST, Some(descriptor))
            .await
    }

    /// Check the live token against the API.
    ///
    /// Meant for manually set tokens that carry no expiry. Any response other
    /// than 401 counts as accepted; a 401 also clears the credential.
    pub async fn probe_validity(&self) -> bool {
        match self.call(&self.probe_path, Method::GET, None).await {
            Ok(_) | Err(Error::RequestFailed { .. }) | Err(Error::InvalidResponse(_)) => true,
            Err(e) => {
                debug!(error = %e, "token probe failed");
                false
            }
        }
    }
}
