//! OpenAI Realtime API module.
//!
//! Bridges a call to OpenAI's WebSocket-based Realtime API using G.711 audio
//! in both directions, so no transcoding is needed between the telephony leg
//! and the backend.
//!
//! # Features
//!
//! - Bidirectional G.711 audio streaming
//! - Server-side voice activity detection and barge-in
//! - Caller and engine transcripts
//! - Call-control tools: `terminate_call` and `transfer_call`
//!
//! # Example
//!
//! ```rust,ignore
//! use ai_voice_connector::core::realtime::{AiEngine, OpenAIConfig, OpenAIRealtime, UnknownEventPolicy};
//! use std::sync::Arc;
//!
//! let session = OpenAIRealtime::new(ctx, Arc::new(config), UnknownEventPolicy::default())?;
//! tokio::spawn(async move { session.start().await });
//! ```

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    MaxOutputTokens, OPENAI_DEFAULT_MODEL, OPENAI_DEFAULT_VOICE, OPENAI_REALTIME_URL_FORMAT,
    OPENAI_TRANSCRIPTION_MODEL, OpenAIConfig, TurnDetectionSettings, WELCOME_INSTRUCTION_PREFIX,
};
pub use messages::{
    ClientEvent, ResponseConfig, ServerEvent, SessionConfig, TOOL_TERMINATE_CALL,
    TOOL_TRANSFER_CALL, TurnDetection, call_control_tools,
};
