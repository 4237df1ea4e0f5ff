//! Service-specific error types

use thiserror::Error;

/// Failure of a single tool invocation.
///
/// Never fatal to the server: every variant is rendered back to the
/// assistant as an error tool result.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error(transparent)]
    Auth(#[from] fhir_auth::Error),

    #[error(transparent)]
    Gateway(#[from] fhir_gateway::Error),
}

impl ToolError {
    /// True when the user has to authenticate again before retrying.
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            ToolError::Auth(e) => matches!(
                e,
                fhir_auth::Error::NoCredential
                    | fhir_auth::Error::NoRefreshToken
                    | fhir_auth::Error::TokenRefreshFailed { .. }
            ),
            ToolError::Gateway(e) => e.requires_reauthentication(),
            _ => false,
        }
    }
}

/// Result alias using the tool error
pub type Result<T> = std::result::Result<T, ToolError>;
