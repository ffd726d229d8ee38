//! # Sessiongate (Remote Session Token Gateway)
//!
//! `sessiongate` runs next to a remote desktop session server and hands out the
//! short-lived credentials needed to attach to a session. It never authenticates
//! users itself; it trusts the host's account model and asks the caller to prove
//! control of an account by creating a file that only that account could own.
//!
//! ## Handshake
//!
//! 1. **Request token:** `GET /?action=requestToken&authUser=<user>&sessionID=<id>`
//!    returns a request token plus the name of an access file.
//! 2. **Session token:** the caller creates the access file inside the
//!    authorization directory, then calls `GET /?action=sessionToken&requestToken=<t>`.
//!    The gateway checks the file's owner and age and returns a session token.
//! 3. **Validation:** the session server posts
//!    `authenticationToken=<t>&sessionId=<id>` and receives an XML verdict with the
//!    owning user name.
//!
//! ## Token Lifetimes
//!
//! | Store | Capacity | Lifetime |
//! |---|---|---|
//! | Request tokens | 500 | 10s |
//! | Session tokens | 100 | 30s |
//!
//! Both stores evict in insertion order when full and every lookup consumes the
//! token. Nothing is persisted: restarting the process invalidates every
//! outstanding token.

pub mod cli;
pub mod gateway;
pub mod tls;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
