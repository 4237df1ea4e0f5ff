//! Authenticated request gateway for the FHIR data API
//!
//! The only path outbound API calls take. Each call asks the
//! `CredentialManager` for a current bearer token, sends the request, and
//! folds the outcome into one error taxonomy:
//!
//! 1. No usable credential → the manager's error, no request sent
//! 2. 401 → credential cleared, `AuthenticationExpired`
//! 3. Other non-2xx → `RequestFailed { status }`
//! 4. Network failure or timeout → `Transport`
//! 5. 2xx → the JSON body, unmodified

pub mod classify;
pub mod error;
pub mod gateway;

pub use classify::{Outcome, classify_status};
pub use error::{Error, Result};
pub use gateway::{DEFAULT_PROBE_PATH, DEFAULT_QUERY_PATH, DEFAULT_TIMEOUT, Gateway};
pub use reqwest::Method;
