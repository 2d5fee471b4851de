//! Environment variable access.
//!
//! Empty variables are treated as unset.

use std::env;
use std::str::FromStr;

pub const EVENT_IP: &str = "EVENT_IP";
pub const EVENT_PORT: &str = "EVENT_PORT";
pub const ENGINE_DEFAULT_FLAVOR: &str = "ENGINE_DEFAULT_FLAVOR";
pub const ENGINE_UNKNOWN_EVENT_POLICY: &str = "ENGINE_UNKNOWN_EVENT_POLICY";

pub const MI_IP: &str = "MI_IP";
pub const MI_PORT: &str = "MI_PORT";
pub const MI_TIMEOUT_MS: &str = "MI_TIMEOUT_MS";

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_API_MODEL: &str = "OPENAI_API_MODEL";
pub const OPENAI_URL: &str = "OPENAI_URL";
pub const OPENAI_VOICE: &str = "OPENAI_VOICE";
pub const OPENAI_INSTRUCTIONS: &str = "OPENAI_INSTRUCTIONS";
pub const OPENAI_WELCOME_MSG: &str = "OPENAI_WELCOME_MSG";
pub const OPENAI_TRANSFER_TO: &str = "OPENAI_TRANSFER_TO";
pub const OPENAI_TRANSFER_BY: &str = "OPENAI_TRANSFER_BY";
pub const OPENAI_TURN_DETECT_TYPE: &str = "OPENAI_TURN_DETECT_TYPE";
pub const OPENAI_TURN_DETECT_SILENCE_MS: &str = "OPENAI_TURN_DETECT_SILENCE_MS";
pub const OPENAI_TURN_DETECT_THRESHOLD: &str = "OPENAI_TURN_DETECT_THRESHOLD";
pub const OPENAI_TURN_DETECT_PREFIX_MS: &str = "OPENAI_TURN_DETECT_PREFIX_MS";
pub const OPENAI_TEMPERATURE: &str = "OPENAI_TEMPERATURE";
pub const OPENAI_MAX_TOKENS: &str = "OPENAI_MAX_TOKENS";

/// Path of a YAML configuration file, used when none is given on the command line.
pub const CONFIG_FILE: &str = "CONFIG_FILE";

/// Every variable read by the gateway.
pub const ALL: &[&str] = &[
    EVENT_IP,
    EVENT_PORT,
    ENGINE_DEFAULT_FLAVOR,
    ENGINE_UNKNOWN_EVENT_POLICY,
    MI_IP,
    MI_PORT,
    MI_TIMEOUT_MS,
    OPENAI_API_KEY,
    OPENAI_API_MODEL,
    OPENAI_URL,
    OPENAI_VOICE,
    OPENAI_INSTRUCTIONS,
    OPENAI_WELCOME_MSG,
    OPENAI_TRANSFER_TO,
    OPENAI_TRANSFER_BY,
    OPENAI_TURN_DETECT_TYPE,
    OPENAI_TURN_DETECT_SILENCE_MS,
    OPENAI_TURN_DETECT_THRESHOLD,
    OPENAI_TURN_DETECT_PREFIX_MS,
    OPENAI_TEMPERATURE,
    OPENAI_MAX_TOKENS,
    CONFIG_FILE,
];

/// Value of `name`, if set and not empty.
pub fn string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parsed value of `name`, if set.
pub fn parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    string(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("Invalid value for {name}: '{raw}' ({e})"))
        })
        .transpose()
}
