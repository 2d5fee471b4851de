//! Base traits and types for AI engine sessions.
//!
//! An AI engine session owns one connection to a realtime conversational
//! backend for the lifetime of a call. It negotiates the session, streams the
//! caller's audio up and relays the backend's audio down through the call's
//! [`RelayQueue`], and interprets backend-issued commands (hang up, transfer).
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> HandshakeSent -> Streaming -> Closed
//! ```
//!
//! There is no reconnection. Any transport or protocol failure after
//! `Connecting` marks the owning call terminated and moves the session to
//! `Closed`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::codec::SharedCodec;
use crate::core::relay::RelayQueue;
use crate::signaling::SharedSignaling;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during an AI engine session.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend sent something that does not follow the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Handshake could not be completed
    #[error("Session setup failed: {0}")]
    SessionSetup(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Session State
// =============================================================================

/// Protocol state of an AI engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionState {
    /// No connection attempt made yet
    #[default]
    Disconnected = 0,
    /// Opening the backend connection
    Connecting = 1,
    /// Session configuration sent
    HandshakeSent = 2,
    /// Receiving response cycles
    Streaming = 3,
    /// Transport closed; terminal
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::HandshakeSent,
            3 => Self::Streaming,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::HandshakeSent => write!(f, "HandshakeSent"),
            SessionState::Streaming => write!(f, "Streaming"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Lock-free holder for a [`SessionState`].
///
/// `Closed` is absorbing: once stored, later transitions are ignored.
#[derive(Debug, Default)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` unless the session is already closed.
    pub fn advance(&self, next: SessionState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != SessionState::Closed as u8).then_some(next as u8)
            })
            .is_ok()
    }

    /// Move to `Closed`. Returns `true` only for the first caller.
    pub fn close(&self) -> bool {
        self.0.swap(SessionState::Closed as u8, Ordering::AcqRel) != SessionState::Closed as u8
    }
}

/// How a single response cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEnd {
    /// `response.done` was received
    ResponseDone,
    /// A frame with an unrecognized type ended the cycle
    UnknownEvent(String),
    /// The session was closed locally while waiting for a frame
    Cancelled,
}

// =============================================================================
// Policies and Flavors
// =============================================================================

/// What the event loop does with a frame type it does not handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownEventPolicy {
    /// Leave the response cycle and stop the session
    #[default]
    EndSession,
    /// Log the frame and keep reading
    Ignore,
}

impl UnknownEventPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndSession => "end_session",
            Self::Ignore => "ignore",
        }
    }
}

impl FromStr for UnknownEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "end_session" | "end" => Ok(Self::EndSession),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unknown event policy '{other}'")),
        }
    }
}

impl fmt::Display for UnknownEventPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI backend variants a call can be bridged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFlavor {
    /// OpenAI Realtime API
    #[default]
    OpenAI,
}

impl BackendFlavor {
    /// All flavors in classification order.
    pub fn all() -> &'static [BackendFlavor] {
        &[Self::OpenAI]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
        }
    }
}

impl FromStr for BackendFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown backend flavor '{s}'"))
    }
}

impl fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Session Context
// =============================================================================

/// Per-call state a session needs from its owning call.
///
/// The `terminated` flag is shared with the call: it only ever goes from
/// `false` to `true`.
#[derive(Clone)]
pub struct SessionContext {
    /// Dialog key of the call
    pub key: String,
    /// Dialog key used for mid-call commands such as REFER
    pub peer_key: String,
    /// Identity from the INVITE `To` header, if any
    pub to: Option<String>,
    /// Codec negotiated for the call
    pub codec: SharedCodec,
    /// Outbound audio queue consumed by the telephony sender
    pub relay: Arc<RelayQueue>,
    /// Signaling collaborator for transfers
    pub signaling: SharedSignaling,
    terminated: Arc<AtomicBool>,
}

impl SessionContext {
    pub fn new(
        key: impl Into<String>,
        codec: SharedCodec,
        relay: Arc<RelayQueue>,
        signaling: SharedSignaling,
        terminated: Arc<AtomicBool>,
    ) -> Self {
        let key = key.into();
        Self {
            peer_key: key.clone(),
            key,
            to: None,
            codec,
            relay,
            signaling,
            terminated,
        }
    }

    pub fn with_to(mut self, to: Option<String>) -> Self {
        self.to = to;
        self
    }

    /// Mark the owning call terminated.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("key", &self.key)
            .field("peer_key", &self.peer_key)
            .field("to", &self.to)
            .field("codec", &self.codec.name())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Capability implemented by every AI backend.
///
/// All methods take `&self` so a session can be shared between the task
/// running [`AiEngine::start`] and the code feeding audio or closing the call.
#[async_trait]
pub trait AiEngine: Send + Sync {
    /// Connect, perform the handshake and run response cycles until the
    /// session ends.
    ///
    /// Failures have already marked the call terminated when this returns.
    async fn start(&self) -> RealtimeResult<()>;

    /// Forward caller audio to the backend.
    ///
    /// No-op when not connected or when the call is terminated. A transport
    /// error marks the call terminated.
    async fn send(&self, audio: Bytes);

    /// Close the transport. Idempotent, and safe before `start` has connected.
    async fn close(&self);

    /// Backend audio format token used for both directions.
    fn audio_format(&self) -> &'static str;

    /// Current protocol state.
    fn state(&self) -> SessionState;

    /// Backend flavor of this session.
    fn flavor(&self) -> BackendFlavor;
}

/// Shared handle to a call's AI engine session.
pub type SharedEngine = Arc<dyn AiEngine>;
