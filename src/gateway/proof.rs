//! Out-of-band account proof through the authorization directory.
//!
//! A caller proves it controls an account by creating a file with a name it can
//! only know from the request-token response. The OS records the creating
//! account as the file owner, which is what gets checked here.

use anyhow::{Context, Result};
use nix::errno::Errno;
use std::{
    io::ErrorKind,
    os::unix::fs::{MetadataExt, PermissionsExt},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, warn};

use super::{error::GatewayError, oracle::account_name};

pub const DEFAULT_AUTH_DIR: &str = "/var/spool/dcv_ext_auth";

// sticky + world writable, not listable
const AUTH_DIR_MODE: u32 = 0o1733;

#[derive(Clone, Debug)]
pub struct ProofDirectory {
    root: PathBuf,
}

impl Default for ProofDirectory {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_AUTH_DIR))
    }
}

impl ProofDirectory {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed and drop files left by a previous run.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or cleaned.
    pub fn prepare(&self) -> Result<()> {
        match std::fs::symlink_metadata(&self.root) {
            Ok(_) => {
                let entries = std::fs::read_dir(&self.root).with_context(|| {
                    format!("Failed to read authorization directory: {}", self.root.display())
                })?;
                for entry in entries {
                    let path = entry?.path();
                    let removed = if path.is_dir() && !path.is_symlink() {
                        std::fs::remove_dir_all(&path)
                    } else {
                        std::fs::remove_file(&path)
                    };
                    removed.with_context(|| format!("Failed to remove {}", path.display()))?;
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                std::fs::create_dir_all(&self.root).with_context(|| {
                    format!("Failed to create authorization directory: {}", self.root.display())
                })?;
                std::fs::set_permissions(
                    &self.root,
                    std::fs::Permissions::from_mode(AUTH_DIR_MODE),
                )
                .with_context(|| {
                    format!("Failed to set permissions on {}", self.root.display())
                })?;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to inspect authorization directory: {}", self.root.display())
                });
            }
        }

        debug!("Authorization directory ready: {}", self.root.display());
        Ok(())
    }

    /// Check the access file `proof_name` and consume it.
    ///
    /// The file must exist, be owned by `user` and be younger than `max_age`.
    /// It is removed only when every check passes.
    ///
    /// # Errors
    /// Returns [`GatewayError::ProofMissing`], [`GatewayError::ProofOwnerMismatch`] or
    /// [`GatewayError::ProofExpired`] for the first failing check.
    pub async fn verify(
        &self,
        user: &str,
        proof_name: &str,
        max_age: Duration,
    ) -> Result<(), GatewayError> {
        let path = self.proof_path(proof_name)?;

        let metadata = tokio::fs::symlink_metadata(&path).await.map_err(|err| {
            debug!("Access file lookup failed: {err}");
            GatewayError::ProofMissing
        })?;
        if !metadata.is_file() {
            return Err(GatewayError::ProofMissing);
        }

        let uid = metadata.uid();
        let owner = tokio::task::spawn_blocking(move || account_name(uid))
            .await
            .map_err(|_| GatewayError::ProofMissing)?;
        check_owner(owner, user)?;

        let modified = metadata.modified().map_err(|_| GatewayError::ProofMissing)?;
        if is_stale(modified, SystemTime::now(), max_age) {
            return Err(GatewayError::ProofExpired);
        }

        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove access file {}: {err}", path.display());
        }

        Ok(())
    }

    fn proof_path(&self, proof_name: &str) -> Result<PathBuf, GatewayError> {
        let plain_name = !proof_name.is_empty()
            && proof_name
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-');
        if plain_name {
            Ok(self.root.join(proof_name))
        } else {
            Err(GatewayError::ProofMissing)
        }
    }
}

// An unreadable account database counts as a missing file, an unknown uid as a mismatch.
fn check_owner(owner: Result<Option<String>, Errno>, user: &str) -> Result<(), GatewayError> {
    match owner {
        Ok(Some(name)) if name == user => Ok(()),
        Ok(_) => Err(GatewayError::ProofOwnerMismatch),
        Err(err) => {
            debug!("Account lookup for access file owner failed: {err}");
            Err(GatewayError::ProofMissing)
        }
    }
}

// A timestamp in the future counts as fresh.
fn is_stale(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(modified)
        .is_ok_and(|age| age > max_age)
}
