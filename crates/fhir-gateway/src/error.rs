//! Error types for gateway calls

/// Errors from an authenticated API call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The credential could not be produced (none live, refresh failed, ...).
    #[error(transparent)]
    Auth(#[from] fhir_auth::Error),

    /// The API rejected the token; the credential has been cleared.
    #[error("authentication expired, re-authenticate")]
    AuthenticationExpired,

    #[error("request failed with status {status}")]
    RequestFailed { status: u16 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether the caller has to authenticate again before retrying.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationExpired
                | Error::Auth(fhir_auth::Error::NoCredential)
                | Error::Auth(fhir_auth::Error::NoRefreshToken)
                | Error::Auth(fhir_auth::Error::TokenRefreshFailed { .. })
        )
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_display_transparently() {
        let err: Error = fhir_auth::Error::NoCredential.into();
        assert_eq!(err.to_string(), fhir_auth::Error::NoCredential.to_string());
    }

    #[test]
    fn reauthentication_is_required_only_for_credential_failures() {
        assert!(Error::AuthenticationExpired.requires_reauthentication());
        assert!(Error::from(fhir_auth::Error::NoCredential).requires_reauthentication());
        assert!(!Error::RequestFailed { status: 500 }.requires_reauthentication());
        assert!(!Error::Transport("timed out".into()).requires_reauthentication());
    }
}
