//! OpenAI Realtime API configuration types.
//!
//! This module contains the settings that shape an OpenAI Realtime session:
//! - Endpoint and model selection
//! - Voice, prompt and welcome message
//! - Turn detection settings
//! - Transfer identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Default OpenAI Realtime model.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// OpenAI Realtime API WebSocket endpoint, `{model}` is substituted.
pub const OPENAI_REALTIME_URL_FORMAT: &str = "wss://api.openai.com/v1/realtime?model={model}";

/// Default voice.
pub const OPENAI_DEFAULT_VOICE: &str = "alloy";

/// Speech-to-text model used to log what the caller said.
pub const OPENAI_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Prefix of the instruction sent with the welcome message.
pub const WELCOME_INSTRUCTION_PREFIX: &str = "Please greet the user with the following: ";

// =============================================================================
// Max Tokens
// =============================================================================

/// Upper bound on tokens in a single backend response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxOutputTokens {
    /// No limit ("inf")
    #[default]
    Unbounded,
    /// Explicit limit
    Limit(u32),
}

impl FromStr for MaxOutputTokens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("inf") {
            return Ok(Self::Unbounded);
        }
        s.parse::<u32>()
            .map(Self::Limit)
            .map_err(|_| format!("invalid max tokens '{s}', expected a number or 'inf'"))
    }
}

impl fmt::Display for MaxOutputTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("inf"),
            Self::Limit(n) => write!(f, "{n}"),
        }
    }
}

// =============================================================================
// Turn Detection
// =============================================================================

/// Backend-side speech endpoint detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionSettings {
    /// Detector type, e.g. "server_vad"
    pub detection_type: String,
    /// Silence that ends a turn
    pub silence_duration_ms: u32,
    /// Activation threshold (0.0 - 1.0)
    pub threshold: f32,
    /// Audio kept before detected speech
    pub prefix_padding_ms: u32,
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self {
            detection_type: "server_vad".to_string(),
            silence_duration_ms: 200,
            threshold: 0.5,
            prefix_padding_ms: 200,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Resolved configuration of the OpenAI engine.
///
/// The API key is zeroized when the configuration is dropped.
#[derive(Clone, PartialEq)]
pub struct OpenAIConfig {
    pub api_key: Option<Zeroizing<String>>,
    pub model: String,
    /// Explicit endpoint; when unset it is derived from the model
    pub url: Option<String>,
    pub voice: String,
    pub instructions: Option<String>,
    pub welcome_message: Option<String>,
    pub transfer_to: Option<String>,
    /// Referrer for transfers; defaults to the call's `To` identity
    pub transfer_by: Option<String>,
    pub turn_detection: TurnDetectionSettings,
    pub temperature: f32,
    pub max_tokens: MaxOutputTokens,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: OPENAI_DEFAULT_MODEL.to_string(),
            url: None,
            voice: OPENAI_DEFAULT_VOICE.to_string(),
            instructions: None,
            welcome_message: None,
            transfer_to: None,
            transfer_by: None,
            turn_detection: TurnDetectionSettings::default(),
            temperature: 0.8,
            max_tokens: MaxOutputTokens::Unbounded,
        }
    }
}

impl OpenAIConfig {
    /// WebSocket endpoint to connect to.
    pub fn ws_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => OPENAI_REALTIME_URL_FORMAT.replace("{model}", &self.model),
        }
    }

    /// Referrer identity for a transfer of a call addressed to `to`.
    pub fn referrer<'a>(&'a self, to: Option<&'a str>) -> Option<&'a str> {
        self.transfer_by.as_deref().or(to)
    }
}

impl fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("url", &self.url)
            .field("voice", &self.voice)
            .field("instructions", &self.instructions)
            .field("welcome_message", &self.welcome_message)
            .field("transfer_to", &self.transfer_to)
            .field("transfer_by", &self.transfer_by)
            .field("turn_detection", &self.turn_detection)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
