//! OpenAI Realtime API WebSocket message types.
//!
//! All events are JSON-encoded and discriminated by their `type` field.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Configure the session
//! - response.create - Ask for a response (used for the welcome message)
//! - input_audio_buffer.append - Append caller audio
//!
//! Server events handled by the session:
//! - response.audio.delta - Audio data chunk
//! - response.audio.done - Audio generation complete
//! - conversation.item.created - Item added to conversation
//! - conversation.item.input_audio_transcription.completed - Caller transcript
//! - response.audio_transcript.done - Assistant transcript
//! - response.function_call_arguments.done - Tool invocation
//! - response.done - Response complete
//! - error - Error occurred
//!
//! Every other server event type deserializes to [`ServerEvent::Other`].

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::{
    MaxOutputTokens, OPENAI_TRANSCRIPTION_MODEL, OpenAIConfig, TurnDetectionSettings,
    WELCOME_INSTRUCTION_PREFIX,
};

/// Tool that ends the call.
pub const TOOL_TERMINATE_CALL: &str = "terminate_call";

/// Tool that hands the call to a human operator.
pub const TOOL_TRANSFER_CALL: &str = "transfer_call";

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent with `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Turn detection configuration
    pub turn_detection: TurnDetection,

    /// Input audio format
    pub input_audio_format: String,

    /// Output audio format
    pub output_audio_format: String,

    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,

    /// Voice for audio output
    pub voice: String,

    /// Temperature for response generation
    pub temperature: f32,

    /// Maximum response output tokens
    pub max_response_output_tokens: MaxTokens,

    /// Tool definitions
    pub tools: Vec<ToolDef>,

    /// Tool choice strategy
    pub tool_choice: String,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SessionConfig {
    /// Build the session configuration for a call using `audio_format` in
    /// both directions.
    pub fn from_config(config: &OpenAIConfig, audio_format: &str) -> Self {
        Self {
            turn_detection: TurnDetection::from(&config.turn_detection),
            input_audio_format: audio_format.to_string(),
            output_audio_format: audio_format.to_string(),
            input_audio_transcription: InputAudioTranscription {
                model: OPENAI_TRANSCRIPTION_MODEL.to_string(),
            },
            voice: config.voice.clone(),
            temperature: config.temperature,
            max_response_output_tokens: config.max_tokens.into(),
            tools: call_control_tools(),
            tool_choice: "auto".to_string(),
            instructions: config.instructions.clone(),
        }
    }
}

/// Maximum tokens configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MaxTokens {
    /// Specific number of tokens
    Number(u32),
    /// Infinite tokens
    Infinite(String), // "inf"
}

impl From<MaxOutputTokens> for MaxTokens {
    fn from(value: MaxOutputTokens) -> Self {
        match value {
            MaxOutputTokens::Unbounded => MaxTokens::Infinite("inf".to_string()),
            MaxOutputTokens::Limit(n) => MaxTokens::Number(n),
        }
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnDetection {
    /// Detector type
    #[serde(rename = "type")]
    pub detection_type: String,
    /// Silence duration in ms
    pub silence_duration_ms: u32,
    /// Activation threshold
    pub threshold: f32,
    /// Audio prefix padding in ms
    pub prefix_padding_ms: u32,
}

impl From<&TurnDetectionSettings> for TurnDetection {
    fn from(settings: &TurnDetectionSettings) -> Self {
        Self {
            detection_type: settings.detection_type.clone(),
            silence_duration_ms: settings.silence_duration_ms,
            threshold: settings.threshold,
            prefix_padding_ms: settings.prefix_padding_ms,
        }
    }
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    pub description: String,
    /// Function parameters JSON schema
    pub parameters: serde_json::Value,
}

impl ToolDef {
    fn function(name: &str, description: &str) -> Self {
        Self {
            tool_type: "function".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }
}

/// The two parameterless call-control functions offered to the model.
pub fn call_control_tools() -> Vec<ToolDef> {
    vec![
        ToolDef::function(
            TOOL_TERMINATE_CALL,
            "Call me when any of the session's parties want to terminate the call. \
             Always say goodbye before hanging up. \
             Send the audio first, then call this function.",
        ),
        ToolDef::function(
            TOOL_TRANSFER_CALL,
            "Call me if a request was received to transfer the call to an operator, a person.",
        ),
    ]
}

/// Response configuration for `response.create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseConfig {
    /// Instructions for this response only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        response: ResponseConfig,
    },
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Ask the backend to greet the caller with `welcome`.
    pub fn welcome(welcome: &str) -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseConfig {
                instructions: Some(format!("{WELCOME_INSTRUCTION_PREFIX}{welcome}")),
            },
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the OpenAI Realtime API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        #[serde(default)]
        error: ApiError,
    },

    /// Audio delta (audio data chunk)
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded audio delta
        delta: String,
    },

    /// Audio done
    #[serde(rename = "response.audio.done")]
    AudioDone {},

    /// Conversation item created
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        /// Created item
        item: CreatedItem,
    },

    /// Input audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Transcript text
        transcript: String,
    },

    /// Audio transcript done
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Full transcript
        transcript: String,
    },

    /// Function call arguments done
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Function name
        name: String,
        /// Call ID
        #[serde(default)]
        call_id: String,
        /// JSON-encoded arguments
        #[serde(default)]
        arguments: String,
    },

    /// Response done
    #[serde(rename = "response.done")]
    ResponseDone {},

    /// Any event type the session does not handle
    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Decode the audio payload of an `AudioDelta`.
    pub fn decode_audio(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

/// Only the discriminator of a server frame, used to name `Other` events.
#[derive(Debug, Deserialize)]
pub struct EventType {
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Item carried by `conversation.item.created`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CreatedItem {
    /// Item ID
    #[serde(default)]
    pub id: Option<String>,
    /// Item status ("completed", "in_progress", ...)
    #[serde(default)]
    pub status: Option<String>,
}

impl CreatedItem {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }
}

/// API error details.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================
