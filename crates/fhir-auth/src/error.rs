//! Error types for credential lifecycle operations

/// Errors from acquiring, refreshing or reading the credential.
///
/// Status-bearing variants carry only the minimal diagnostics the token or
/// sign-in endpoint gave back; rendering them for users is the caller's job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no access token available, authenticate first")]
    NoCredential,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token exchange failed: {status} {status_text}")]
    TokenExchangeFailed { status: u16, status_text: String },

    #[error("token refresh failed: {status} {status_text}")]
    TokenRefreshFailed { status: u16, status_text: String },

    #[error("authentication failed: {status} {status_text}: {body}")]
    AuthenticationFailed {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
