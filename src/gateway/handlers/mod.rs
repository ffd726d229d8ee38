pub mod auth;
pub use self::auth::auth;

pub mod health;
pub use self::health::health;

pub mod tokens;
pub use self::tokens::tokens;

// common functions for the handlers
use std::collections::BTreeMap;
use url::form_urlencoded;

use super::error::GatewayError;

const INCORRECT_PARAMETER_COUNT: &str = "Incorrect number of parameters passed";

pub(crate) type Params = BTreeMap<String, String>;

/// Decode an `application/x-www-form-urlencoded` payload (query string or body).
///
/// Pairs with a blank value are dropped, so `key=` counts as a missing key.
/// Repeated keys are rejected rather than silently collapsed.
pub(crate) fn parse_params(raw: &[u8]) -> Result<Params, GatewayError> {
    let mut params = Params::new();
    for (key, value) in form_urlencoded::parse(raw) {
        if value.is_empty() {
            continue;
        }
        if params.insert(key.into_owned(), value.into_owned()).is_some() {
            return Err(GatewayError::malformed(INCORRECT_PARAMETER_COUNT));
        }
    }

    if params.is_empty() {
        return Err(GatewayError::malformed(INCORRECT_PARAMETER_COUNT));
    }

    Ok(params)
}

/// Require the parameter names to be exactly `expected`.
pub(crate) fn expect_params(params: &Params, expected: &[&str]) -> Result<(), GatewayError> {
    if params.len() != expected.len() {
        return Err(GatewayError::malformed(INCORRECT_PARAMETER_COUNT));
    }

    if expected.iter().all(|key| params.contains_key(*key)) {
        Ok(())
    } else {
        Err(GatewayError::malformed(format!(
            "Incorrect parameters for the request, they should be {}",
            expected.join(", ")
        )))
    }
}

/// Look up a parameter already checked by [`expect_params`].
pub(crate) fn param<'a>(params: &'a Params, key: &str) -> &'a str {
    params.get(key).map_or("", String::as_str)
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
