// SPDX-License-Identifier: MIT
//! Call-boundary authentication.
//!
//! Every RPC request carries an `auth` member holding a `Bearer <secret>`
//! credential — the transport analog of an authorization header.
//! [`authorize`] classifies it before any handler runs; the shared secret
//! itself is provisioned once at startup.

use anyhow::Result;
use std::path::Path;
use uuid::Uuid;

/// Authentication failures, in order of how much the caller got right.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential at all, or a blank one.
    #[error("missing authorization token")]
    Unauthenticated,
    /// A credential was presented but does not match the shared secret.
    #[error("invalid authorization token")]
    PermissionDenied,
}

/// Return the shared secret for this daemon instance.
///
/// On first call, generates a random 32-character hex token and writes it to
/// `{data_dir}/auth_token` with user-only read/write permissions (mode 0600
/// on Unix). On subsequent calls, reads and returns the existing token.
///
/// The token file must be kept secret — it is the only credential protecting
/// the daemon port from unauthorized access by other processes on the same
/// machine. Client commands read the same file.
pub fn get_or_create_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");

    if path.exists() {
        let token = std::fs::read_to_string(&path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    // Generate a new token (UUID v4, hex without dashes = 32 chars)
    let token = Uuid::new_v4().to_string().replace('-', "");

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &token)?;

    // Restrict to owner read/write only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(token)
}

/// Classify the credential attached to an inbound request.
///
/// Absent or blank after trimming → [`AuthError::Unauthenticated`]; anything
/// but the exact `"Bearer {expected}"` form → [`AuthError::PermissionDenied`].
pub fn authorize(credential: Option<&str>, expected: &str) -> Result<(), AuthError> {
    let value = credential.unwrap_or_default();
    if value.trim().is_empty() {
        return Err(AuthError::Unauthenticated);
    }
    let matches = value
        .strip_prefix("Bearer ")
        .map(|t| t == expected)
        .unwrap_or(false);
    if !matches {
        return Err(AuthError::PermissionDenied);
    }
    Ok(())
}
