use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

use crate::tls::TlsPaths;

pub const ARG_CERTIFICATE: &str = "certificate";
pub const ARG_KEY: &str = "key";

/// Parse the optional TLS arguments. `None` means plain HTTP.
#[must_use]
pub fn parse(matches: &ArgMatches) -> Option<TlsPaths> {
    let non_empty = |id: &str| {
        matches
            .get_one::<String>(id)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    };

    non_empty(ARG_CERTIFICATE).map(|cert| TlsPaths::new(cert, non_empty(ARG_KEY)))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CERTIFICATE)
                .long(ARG_CERTIFICATE)
                .help("Path to the TLS certificate (PEM); enables HTTPS")
                .long_help(
                    "Path to the TLS certificate chain (PEM). When set the gateway serves HTTPS. Without --key the private key is read from this file.",
                )
                .env("SESSIONGATE_CERTIFICATE"),
        )
        .arg(
            Arg::new(ARG_KEY)
                .long(ARG_KEY)
                .help("Path to the TLS private key (PEM)")
                .env("SESSIONGATE_KEY")
                .requires(ARG_CERTIFICATE),
        )
}
