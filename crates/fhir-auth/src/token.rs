//! Token endpoint and vendor sign-in calls
//!
//! Three network interactions acquire a credential:
//! 1. Authorization code exchange (form POST, `grant_type=authorization_code`)
//! 2. Token refresh (form POST, `grant_type=refresh_token`)
//! 3. Vendor sign-in (JSON POST of username/password under the API origin)
//!
//! These functions are stateless; `CredentialManager` stamps issuance time,
//! installs the result and persists it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::constants::{BEARER, DEFAULT_SIGN_IN_EXPIRES_IN};
use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub patient: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Response from the vendor sign-in endpoint.
///
/// The vendor names the access token `token` on some deployments and
/// `access_token` on others; `into_credential` is the one place that
/// reconciles the two.
#[derive(Deserialize, Default)]
pub struct SignInResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SignInResponse {
    /// Normalize into the canonical credential shape.
    ///
    /// Rules:
    /// - access token: `token`, else `access_token`, else malformed
    /// - token type: `token_type`, else `Bearer`
    /// - lifetime: `expires_in`, else 3600 seconds
    /// - refresh token: passed through when present
    pub fn into_credential(self, issued_at: u64) -> Result<Credential> {
        let access_token = self
            .token
            .filter(|t| !t.is_empty())
            .or(self.access_token.filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                Error::MalformedResponse("sign-in response carries no token".into())
            })?;
        let mut credential = Credential::manual(access_token, issued_at);
        credential.token_type = self.token_type.unwrap_or_else(|| BEARER.to_string());
        credential.expires_in = Some(self.expires_in.unwrap_or(DEFAULT_SIGN_IN_EXPIRES_IN));
        credential.refresh_token = self.refresh_token;
        Ok(credential)
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &AuthConfig,
    code: &str,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];
    if let Some(secret) = config.client_secret() {
        form.push(("client_secret", secret));
    }

    let response = client
        .post(&config.token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        debug!(status = status.as_u16(), "token endpoint rejected code exchange");
        return Err(Error::TokenExchangeFailed {
            status: status.as_u16(),
            status_text: status_text(status),
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid token response: {e}")))
}

/// Obtain a new access token with a refresh token.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &AuthConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh),
        ("client_id", config.client_id.as_str()),
    ];
    if let Some(secret) = config.client_secret() {
        form.push(("client_secret", secret));
    }

    let response = client
        .post(&config.token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        debug!(status = status.as_u16(), "token endpoint rejected refresh");
        return Err(Error::TokenRefreshFailed {
            status: status.as_u16(),
            status_text: status_text(status),
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid refresh response: {e}")))
}

/// Sign in with username and password against the vendor endpoint.
pub async fn sign_in(
    client: &reqwest::Client,
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<SignInResponse> {
    let response = client
        .post(config.sign_in_url())
        .json(&SignInRequest { username, password })
        .send()
        .await
        .map_err(|e| Error::Transport(format!("sign-in request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::AuthenticationFailed {
            status: status.as_u16(),
            status_text: status_text(status),
            body,
        });
    }

    response
        .json::<SignInResponse>()
        .await
        .map_err(|e| Error::MalformedResponse(format!("invalid sign-in response: {e}")))
}

fn status_text(status: reqwest::StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use mockito::Matcher;

    fn config_for(server: &mockito::Server) -> AuthConfig {
        let mut config = AuthConfig::new(
            "client-1",
            format!("{}/authorize", server.url()),
            format!("{}/token", server.url()),
            server.url(),
        );
        config.redirect_uri = "http://localhost/callback".into();
        config
    }

    #[test]
    fn token_response_deserializes_smart_fields() {
        let json = r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,
            "refresh_token":"rt","scope":"launch/patient","patient":"p-1","id_token":"jwt"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.expires_in, Some(3600));
        assert_eq!(token.patient.as_deref(), Some("p-1"));
    }

    #[test]
    fn token_response_tolerates_minimal_body() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn sign_in_prefers_token_field() {
        let response = SignInResponse {
            token: Some("from-token".into()),
            access_token: Some("from-access-token".into()),
            ..Default::default()
        };
        let cred = response.into_credential(10).unwrap();
        assert_eq!(cred.access_token, "from-token");
        assert_eq!(cred.token_type, "Bearer");
        assert_eq!(cred.expires_in, Some(3600));
        assert_eq!(cred.issued_at, 10);
    }

    #[test]
    fn sign_in_falls_back_to_access_token() {
        let response: SignInResponse = serde_json::from_str(
            r#"{"access_token":"T2","token_type":"bearer","expires_in":60,"refresh_token":"R"}"#,
        )
        .unwrap();
        let cred = response.into_credential(0).unwrap();
        assert_eq!(cred.access_token, "T2");
        assert_eq!(cred.token_type, "bearer");
        assert_eq!(cred.expires_in, Some(60));
        assert_eq!(cred.refresh_token.as_deref(), Some("R"));
    }

    #[test]
    fn sign_in_without_any_token_is_malformed() {
        let result = SignInResponse::default().into_credential(0);
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn exchange_posts_form_with_client_secret() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "abc".into()),
                Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost/callback".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","expires_in":3600,"refresh_token":"rt"}"#)
            .create_async()
            .await;

        let mut config = config_for(&server);
        config.client_secret = Some(Secret::from("s3cret"));
        let token = exchange_code(&reqwest::Client::new(), &config, "abc")
            .await
            .unwrap();
        assert_eq!(token.access_token, "at");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exchange_rejection_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let result = exchange_code(&reqwest::Client::new(), &config_for(&server), "abc").await;
        match result {
            Err(Error::TokenExchangeFailed {
                status,
                status_text,
            }) => {
                assert_eq!(status, 400);
                assert_eq!(status_text, "Bad Request");
            }
            _ => panic!("expected TokenExchangeFailed"),
        }
    }

    #[tokio::test]
    async fn refresh_rejection_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(401)
            .create_async()
            .await;

        let result = refresh_token(&reqwest::Client::new(), &config_for(&server), "rt").await;
        assert!(matches!(
            result,
            Err(Error::TokenRefreshFailed { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn sign_in_posts_json_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/sign-in")
            .match_body(Matcher::Json(
                serde_json::json!({"username": "a", "password": "b"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"T1","expires_in":3600}"#)
            .create_async()
            .await;

        let response = sign_in(&reqwest::Client::new(), &config_for(&server), "a", "b")
            .await
            .unwrap();
        assert_eq!(response.token.as_deref(), Some("T1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sign_in_rejection_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/auth/sign-in")
            .with_status(403)
            .with_body("account locked")
            .create_async()
            .await;

        let result = sign_in(&reqwest::Client::new(), &config_for(&server), "a", "b").await;
        match result {
            Err(Error::AuthenticationFailed { status, body, .. }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "account locked");
            }
            _ => panic!("expected AuthenticationFailed"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_failure() {
        let config = AuthConfig::new("c", "http://127.0.0.1:9/a", "http://127.0.0.1:9/t", "http://127.0.0.1:9");
        let result = refresh_token(&reqwest::Client::new(), &config, "rt").await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
