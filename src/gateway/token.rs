//! Random token and access-file name generation.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha512};
use std::sync::LazyLock;

pub const TOKEN_LENGTH: usize = 256;

// 64 symbols, so the low 6 bits of a random byte index it without bias.
const ALPHABET: &[u8; 64] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

static TOKEN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{256}$").ok());

/// Generate a token of `length` characters using the OS CSPRNG.
///
/// # Errors
/// Returns an error if the OS randomness source is unavailable.
pub fn generate_token(length: usize) -> Result<String> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(bytes
        .iter()
        .map(|byte| char::from(ALPHABET[usize::from(byte & 0x3f)]))
        .collect())
}

/// Derive the access-file name for a request token.
///
/// The name is the hex SHA-512 of the token followed by a fresh random salt. The
/// salt is discarded, so the name cannot be recomputed from the token later: the
/// only way to learn it is from the response that issued the token.
///
/// # Errors
/// Returns an error if the salt cannot be generated.
pub fn derive_proof_name(token: &str) -> Result<String> {
    let salt = generate_token(TOKEN_LENGTH)?;
    let mut hasher = Sha512::new();
    hasher.update(token.as_bytes());
    hasher.update(salt.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Check that a value has the exact shape of an issued token.
pub fn is_token(value: &str) -> bool {
    TOKEN_PATTERN
        .as_ref()
        .is_some_and(|regex| regex.is_match(value))
}
