//! Credential lifecycle for the FHIR data API
//!
//! Owns the single bearer credential the process authenticates with:
//! acquisition (authorization-code exchange, refresh, vendor sign-in, manual
//! injection), persistence to a per-user token file, and the lazy
//! refresh-on-read policy every outbound call depends on.
//!
//! Credential flow:
//! 1. Caller builds a redirect via `CredentialManager::authorization_url()`
//! 2. The returned code goes to `CredentialManager::exchange_code()`
//!    (or the caller uses `sign_in()` / `set_access_token()` instead)
//! 3. The credential is kept in memory and mirrored via `TokenStore::save()`
//! 4. `current_access_token()` refreshes when within five minutes of expiry
//! 5. `clear_token()` drops the credential and deletes the token file

pub mod authorize;
pub mod clock;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod token;

pub use authorize::{build_authorization_url, generate_state};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use constants::*;
pub use credentials::{Credential, TokenStore};
pub use error::{Error, Result};
pub use manager::CredentialManager;
pub use token::{SignInResponse, TokenResponse, exchange_code, refresh_token, sign_in};
