//! Session existence checks.
//!
//! The session server spawns one agent process per session, owned by the session
//! user and started as `<agent> --session-id <id>`. A session "exists" when such a
//! process shows up in the process table. Right after a session is created the
//! agent may not be listed yet, so callers go through [`verify_session`], which
//! retries with a fixed delay.

use nix::{
    errno::Errno,
    unistd::{Uid, User},
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use thiserror::Error;
use tracing::{debug, instrument};

use super::error::GatewayError;

pub const DEFAULT_SESSION_AGENT: &str = "/usr/libexec/dcv/dcvagent";

const SESSION_ID_FLAG: &str = "--session-id";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no session agent found for the given user and session")]
    SessionNotFound,
    #[error("process table lookup failed: {0}")]
    Probe(String),
}

/// Answers whether a session agent for `(user, session_id)` is running.
pub trait SessionOracle: Send + Sync {
    /// # Errors
    /// Returns [`OracleError::SessionNotFound`] when no matching agent runs, or
    /// [`OracleError::Probe`] when the lookup itself failed.
    fn check_session(&self, user: &str, session_id: &str) -> Result<(), OracleError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Check session existence, retrying according to `policy`.
///
/// Probes run on the blocking pool. Nothing is locked while waiting between
/// attempts.
///
/// # Errors
/// Returns [`GatewayError::InvalidSession`] once every attempt has failed.
#[instrument(skip(oracle, policy))]
pub async fn verify_session(
    oracle: &Arc<dyn SessionOracle>,
    policy: RetryPolicy,
    user: &str,
    session_id: &str,
) -> Result<(), GatewayError> {
    for attempt in 1..=policy.attempts() {
        let probe = oracle.clone();
        let (probe_user, probe_session) = (user.to_string(), session_id.to_string());
        let outcome =
            tokio::task::spawn_blocking(move || probe.check_session(&probe_user, &probe_session))
                .await;

        match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => debug!("Session check attempt {attempt} failed: {err}"),
            Err(err) => debug!("Session check attempt {attempt} panicked: {err}"),
        }

        if attempt < policy.attempts() {
            tokio::time::sleep(policy.delay()).await;
        }
    }

    Err(GatewayError::InvalidSession)
}

/// Oracle backed by the host process table.
#[derive(Clone, Debug)]
pub struct ProcessTableOracle {
    agent: PathBuf,
}

impl Default for ProcessTableOracle {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_SESSION_AGENT))
    }
}

impl ProcessTableOracle {
    #[must_use]
    pub fn new(agent: PathBuf) -> Self {
        Self { agent }
    }

    #[must_use]
    pub fn agent(&self) -> &Path {
        &self.agent
    }
}

impl SessionOracle for ProcessTableOracle {
    fn check_session(&self, user: &str, session_id: &str) -> Result<(), OracleError> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cmd(UpdateKind::Always)
                .with_user(UpdateKind::Always),
        );

        if system.processes().is_empty() {
            return Err(OracleError::Probe(
                "process table is empty or unreadable".to_string(),
            ));
        }

        let found = system.processes().values().any(|process| {
            let Some(uid) = process.user_id() else {
                return false;
            };
            // Cheap command match first; the account lookup hits the user database.
            command_matches(process.cmd(), &self.agent, session_id)
                && account_name(**uid).ok().flatten().as_deref() == Some(user)
        });

        if found {
            Ok(())
        } else {
            Err(OracleError::SessionNotFound)
        }
    }
}

/// `true` when `cmd` is `<agent> --session-id <session_id>`, extra arguments allowed.
pub(crate) fn command_matches(cmd: &[OsString], agent: &Path, session_id: &str) -> bool {
    let Some((program, args)) = cmd.split_first() else {
        return false;
    };
    if Path::new(program) != agent {
        return false;
    }

    args.windows(2)
        .any(|pair| pair[0] == SESSION_ID_FLAG && pair[1].to_str() == Some(session_id))
}

/// Resolve a uid to its account name.
///
/// `Ok(None)` means the uid has no account entry; `Err` means the account
/// database could not be read.
pub(crate) fn account_name(uid: u32) -> Result<Option<String>, Errno> {
    User::from_uid(Uid::from_raw(uid)).map(|user| user.map(|user| user.name))
}
