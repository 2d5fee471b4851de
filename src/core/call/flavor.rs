//! Caller classification.
//!
//! The user part of the INVITE's `To` URI decides which AI backend a call is
//! bridged to: a user equal to a flavor name selects that flavor, a user
//! ending in a decimal digit `d` selects `flavors[d % flavors.len()]`, and any
//! other user keeps the default flavor.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{CallError, CallResult};
use crate::core::realtime::BackendFlavor;

static SIP_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?P<scheme>\w+):",
        r"(?:(?P<user>[\w.+*]+):?(?P<password>[\w.]+)?@)?",
        r"\[?(?P<host>",
        r"(?:\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})|",
        r"(?:(?:[0-9a-fA-F]{1,4}):){7}[0-9a-fA-F]{1,4}|",
        r"(?:(?:[0-9A-Za-z]+\.)+[0-9A-Za-z]+)",
        r")\]?:?",
        r"(?P<port>\d{1,6})?",
    ))
    .expect("valid SIP URI pattern")
});

/// Result of classifying an incoming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Backend the call is bridged to
    pub flavor: BackendFlavor,
    /// `To` URI of the INVITE, without parameters
    pub to: Option<String>,
}

/// Classify a call from the raw SIP `headers` of its INVITE.
///
/// Calls without headers or without a `To` header use `default`.
pub fn classify(
    headers: Option<&str>,
    flavors: &[BackendFlavor],
    default: BackendFlavor,
) -> CallResult<Caller> {
    let fallback = Caller {
        flavor: default,
        to: None,
    };

    let Some(headers) = headers else {
        return Ok(fallback);
    };
    let Some(to_value) = headers.lines().find_map(to_header_value) else {
        return Ok(fallback);
    };

    let captures = SIP_URI
        .captures(to_value)
        .ok_or_else(|| CallError::UnknownCaller(to_value.trim().to_string()))?;
    let uri = captures
        .get(0)
        .map(|m| m.as_str().trim_end_matches(':').to_string());
    let user = captures
        .name("user")
        .map(|m| m.as_str())
        .ok_or_else(|| CallError::UnknownCaller(to_value.trim().to_string()))?;

    let flavor = select_flavor(user, flavors, default)
        .ok_or_else(|| CallError::UnknownCaller(user.to_string()))?;

    Ok(Caller { flavor, to: uri })
}

fn to_header_value(line: &str) -> Option<&str> {
    let (name, value) = line.split_once(':')?;
    name.trim().eq_ignore_ascii_case("To").then_some(value)
}

fn select_flavor(
    user: &str,
    flavors: &[BackendFlavor],
    default: BackendFlavor,
) -> Option<BackendFlavor> {
    if flavors.is_empty() {
        return None;
    }
    if let Some(flavor) = flavors.iter().find(|f| f.as_str() == user) {
        return Some(*flavor);
    }
    match user.chars().last().and_then(|c| c.to_digit(10)) {
        Some(digit) => Some(flavors[digit as usize % flavors.len()]),
        None => Some(default),
    }
}
