//! Credential lifecycle constants
//!
//! Fixed values shared by the token store, the manager's expiry check and
//! the sign-in normalization. Endpoint locations are configuration, not
//! constants; see `AuthConfig`.

/// Token kind attached to every request.
pub const BEARER: &str = "Bearer";

/// A token is refreshed once its expiry is this close (milliseconds).
pub const REFRESH_MARGIN_MILLIS: u64 = 5 * 60 * 1000;

/// Lifetime assumed for sign-in tokens that carry no `expires_in`.
pub const DEFAULT_SIGN_IN_EXPIRES_IN: u64 = 3600;

/// Per-user directory (under the home directory) holding the token file.
pub const TOKEN_DIR_NAME: &str = ".fhir-mcp";

/// File name of the persisted token record.
pub const TOKEN_FILE_NAME: &str = "token.json";

/// Default vendor sign-in path, relative to the API origin.
pub const DEFAULT_SIGN_IN_PATH: &str = "/auth/sign-in";
