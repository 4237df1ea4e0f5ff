//! The credential and its on-disk mirror
//!
//! `Credential` is the unit of authentication state. `TokenStore` keeps a
//! single pretty-printed JSON copy of it at a per-user path so a restart
//! does not force re-authentication. The file is plain text at rest; writes
//! use temp-file + rename and 0600 permissions, which limits but does not
//! remove that exposure.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{BEARER, REFRESH_MARGIN_MILLIS, TOKEN_DIR_NAME, TOKEN_FILE_NAME};
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The live bearer credential.
///
/// `expires_in` is a delta in seconds from `issued_at` (unix milliseconds).
/// A credential without `expires_in` never refreshes on its own.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Patient context granted by a SMART-style token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub issued_at: u64,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

impl Credential {
    /// Build a credential from a token endpoint response obtained at `issued_at`.
    pub fn from_token_response(response: TokenResponse, issued_at: u64) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(default_token_type),
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
            scope: response.scope,
            patient: response.patient,
            id_token: response.id_token,
            issued_at,
        }
    }

    /// A bare access token supplied out of band: no expiry, no refresh token.
    pub fn manual(access_token: String, issued_at: u64) -> Self {
        Self {
            access_token,
            token_type: default_token_type(),
            expires_in: None,
            refresh_token: None,
            scope: None,
            patient: None,
            id_token: None,
            issued_at,
        }
    }

    /// Absolute expiry in unix milliseconds, if the credential carries one.
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_in
            .map(|secs| self.issued_at.saturating_add(secs.saturating_mul(1000)))
    }

    /// Whether a read at `now_millis` must refresh before handing out the token.
    pub fn needs_refresh(&self, now_millis: u64) -> bool {
        match self.expires_at() {
            Some(expires_at) => now_millis >= expires_at.saturating_sub(REFRESH_MARGIN_MILLIS),
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("patient", &self.patient)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// File mirror of the live credential.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `~/.fhir-mcp/token.json` for the user running the process.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(TOKEN_DIR_NAME).join(TOKEN_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credential.
    ///
    /// A missing file is `Ok(None)`. Unreadable or unparseable files are
    /// errors; the manager downgrades those to "no credential".
    pub async fn load(&self) -> Result<Option<Credential>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted token");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
        };
        let credential: Credential = serde_json::from_str(&contents)
            .map_err(|e| Error::MalformedResponse(format!("parsing token file: {e}")))?;
        info!(path = %self.path.display(), "loaded persisted token");
        Ok(Some(credential))
    }

    /// Write the credential, replacing any previous record.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;
        }
        write_atomic(&self.path, credential).await
    }

    /// Remove the token file. Already-absent is success.
    pub async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "deleted token file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("deleting token file: {e}"))),
        }
    }
}

/// Write the credential to `path` via a temp file in the same directory.
///
/// Sets 0600 before the rename so the token is never world-readable.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::Io(format!("serializing token: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp_path = dir.join(format!(".{TOKEN_FILE_NAME}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token");
    Ok(())
}
