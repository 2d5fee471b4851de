//! Per-call state and lifecycle.
//!
//! A [`Call`] ties one SIP dialog to one AI engine session. It owns the
//! negotiated codec, the outbound [`RelayQueue`] the engine fills and the
//! telephony sender drains, and the shared `terminated` flag both sides use
//! to signal that the call is over.
//!
//! Calls are created and torn down by the [`CallManager`] and indexed by
//! dialog key in the [`CallRegistry`].

mod flavor;
mod manager;
mod registry;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

pub use flavor::{Caller, classify};
pub use manager::{CallManager, CallManagerConfig, EngineFactory, openai_factory};
pub use registry::CallRegistry;

use crate::core::codec::{CodecError, SharedCodec};
use crate::core::realtime::{BackendFlavor, RealtimeError, SessionState, SharedEngine};
use crate::core::relay::RelayQueue;

/// Errors raised while setting up or running a call.
#[derive(Debug, Error)]
pub enum CallError {
    /// No offered codec is supported
    #[error(transparent)]
    UnsupportedCodec(#[from] CodecError),

    /// The `To` user does not map to a backend flavor
    #[error("Unknown caller: {0}")]
    UnknownCaller(String),

    /// The engine session could not be created
    #[error("Engine error: {0}")]
    Engine(#[from] RealtimeError),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// SIP status used to reject the INVITE that caused this error.
    pub fn reply_status(&self) -> (u16, &'static str) {
        match self {
            CallError::UnsupportedCodec(_) => (488, "Not Acceptable Here"),
            CallError::UnknownCaller(_) => (404, "Not Found"),
            CallError::Engine(_) | CallError::Internal(_) => (500, "Server Internal Error"),
        }
    }
}

pub type CallResult<T> = Result<T, CallError>;

/// One bridged call.
pub struct Call {
    key: String,
    sdp: String,
    to: Option<String>,
    flavor: BackendFlavor,
    codec: SharedCodec,
    relay: Arc<RelayQueue>,
    session: SharedEngine,
    terminated: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl Call {
    pub(crate) fn new(
        key: String,
        sdp: String,
        caller: Caller,
        codec: SharedCodec,
        relay: Arc<RelayQueue>,
        session: SharedEngine,
        terminated: Arc<AtomicBool>,
    ) -> Self {
        Self {
            key,
            sdp,
            to: caller.to,
            flavor: caller.flavor,
            codec,
            relay,
            session,
            terminated,
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// SDP offer of the INVITE.
    pub fn sdp(&self) -> &str {
        &self.sdp
    }

    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    pub fn flavor(&self) -> BackendFlavor {
        self.flavor
    }

    pub fn codec(&self) -> &SharedCodec {
        &self.codec
    }

    pub fn relay(&self) -> &Arc<RelayQueue> {
        &self.relay
    }

    pub fn session(&self) -> &SharedEngine {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Forward one packet of caller audio to the engine.
    pub async fn send_audio(&self, audio: Bytes) {
        if self.is_closed() {
            return;
        }
        self.session.send(audio).await;
    }

    /// Next packet for the telephony sender: queued engine audio, or one
    /// frame of codec silence when the queue is empty.
    pub fn next_packet(&self) -> Bytes {
        self.relay
            .try_dequeue()
            .unwrap_or_else(|| self.codec.silence_packet())
    }

    /// Close the engine session and discard queued audio.
    ///
    /// Returns `true` for the call that actually performed the close.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.terminated.store(true, Ordering::SeqCst);
        self.session.close().await;
        let dropped = self.relay.drain();
        debug!(call_key = %self.key, dropped, "Call closed");
        true
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("key", &self.key)
            .field("to", &self.to)
            .field("flavor", &self.flavor)
            .field("codec", &self.codec.name())
            .field("session", &self.session.state())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
