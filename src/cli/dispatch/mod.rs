//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_AUTH_DIR, ARG_PORT, ARG_SESSION_AGENT, DEFAULT_PORT, tls};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(ARG_PORT)
        .copied()
        .unwrap_or(DEFAULT_PORT);

    let path_arg = |id: &str| -> Result<PathBuf> {
        matches
            .get_one::<String>(id)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .with_context(|| format!("missing required argument: --{id}"))
    };

    Ok(Action::Server(Args {
        port,
        auth_dir: path_arg(ARG_AUTH_DIR)?,
        session_agent: path_arg(ARG_SESSION_AGENT)?,
        tls: tls::parse(matches),
    }))
}
