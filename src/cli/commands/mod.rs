pub mod logging;
pub mod tls;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

use crate::gateway::{oracle::DEFAULT_SESSION_AGENT, proof::DEFAULT_AUTH_DIR};

pub const ARG_PORT: &str = "port";
pub const ARG_AUTH_DIR: &str = "auth-dir";
pub const ARG_SESSION_AGENT: &str = "session-agent";

pub const DEFAULT_PORT: u16 = 8444;

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("sessiongate")
        .about("Token gateway for remote desktop session access")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on (127.0.0.1 only)")
                .default_value("8444")
                .env("SESSIONGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_AUTH_DIR)
                .long(ARG_AUTH_DIR)
                .help("Directory where callers create access files")
                .long_help(
                    "Directory where callers create access files. Created with mode 1733 if missing; emptied at startup.",
                )
                .default_value(DEFAULT_AUTH_DIR)
                .env("SESSIONGATE_AUTH_DIR"),
        )
        .arg(
            Arg::new(ARG_SESSION_AGENT)
                .long(ARG_SESSION_AGENT)
                .help("Path of the per-session agent binary to look for in the process table")
                .default_value(DEFAULT_SESSION_AGENT)
                .env("SESSIONGATE_SESSION_AGENT"),
        );

    let command = tls::with_args(command);
    logging::with_args(command)
}
