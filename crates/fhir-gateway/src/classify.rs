//! Upstream status classification
//!
//! Maps an HTTP status from the API onto what the gateway does next. Only
//! 401 means the credential itself is bad; 403 and everything else non-2xx
//! is an ordinary request failure the caller may inspect.

/// What a response status means for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx: hand the body back
    Success,
    /// 401: drop the credential, caller must re-authenticate
    AuthenticationExpired,
    /// Any other status
    Failed,
}

pub fn classify_status(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        401 => Outcome::AuthenticationExpired,
        _ => Outcome::Failed,
    }
}
