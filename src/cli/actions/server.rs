use crate::{
    gateway::{self, GatewayConfig, ProcessTableOracle, ProofDirectory},
    tls::{TlsPaths, load_server_config},
};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub auth_dir: PathBuf,
    pub session_agent: PathBuf,
    pub tls: Option<TlsPaths>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if TLS material cannot be loaded, the authorization
/// directory cannot be prepared, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let tls = args.tls.as_ref().map(load_server_config).transpose()?;
    let config = GatewayConfig::default();
    let oracle = Arc::new(ProcessTableOracle::new(args.session_agent));
    let proofs = ProofDirectory::new(args.auth_dir);

    gateway::new(
        args.port,
        config,
        oracle,
        proofs,
        tls,
        gateway::shutdown_signal(),
    )
    .await
}

fn log_startup_args(args: &Args) {
    let (scheme, certificate, key) = match &args.tls {
        Some(paths) => (
            "https",
            paths.cert_path().display().to_string(),
            paths.key_path().display().to_string(),
        ),
        None => ("http", "none".to_string(), "none".to_string()),
    };
    let config = GatewayConfig::default();
    let entries = [
        ("listen", format!("{scheme}://127.0.0.1:{}", args.port)),
        ("auth_dir", args.auth_dir.display().to_string()),
        ("session_agent", args.session_agent.display().to_string()),
        ("certificate", certificate),
        ("key", key),
        (
            "request_tokens",
            format!(
                "{} max, {}s ttl",
                config.request_token_capacity(),
                config.request_token_ttl().as_secs()
            ),
        ),
        (
            "session_tokens",
            format!(
                "{} max, {}s ttl",
                config.session_token_capacity(),
                config.session_token_ttl().as_secs()
            ),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

const BANNER: &str = r"
  +-----------+
  |  [=] [=]  |
  |    -+-    |  S E S S I O N G A T E {VERSION}
  |  [=] [=]  |
  +-----------+";
