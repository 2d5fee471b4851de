//! Realtime AI engine sessions.
//!
//! This module provides the [`AiEngine`] abstraction a call uses to talk to a
//! realtime conversational backend, and its implementations.
//!
//! # Supported Backends
//!
//! - **OpenAI Realtime API** - full duplex G.711 audio with GPT-4o
//!
//! # Audio Format
//!
//! Sessions exchange audio with the backend in the call's negotiated G.711
//! variant (`g711_alaw` or `g711_ulaw`). Backend audio is re-framed into
//! codec-sized packets and queued on the call's [`RelayQueue`].
//!
//! [`RelayQueue`]: crate::core::relay::RelayQueue

mod base;
pub mod openai;

use std::sync::Arc;

pub use base::{
    AiEngine, AtomicSessionState, BackendFlavor, CycleEnd, RealtimeError, RealtimeResult,
    SessionContext, SessionState, SharedEngine, UnknownEventPolicy,
};
pub use openai::{OpenAIConfig, OpenAIRealtime};

/// Create the engine session for a call bridged to `flavor`.
///
/// # Example
///
/// ```rust,ignore
/// use ai_voice_connector::core::realtime::{create_engine, BackendFlavor, UnknownEventPolicy};
///
/// let engine = create_engine(BackendFlavor::OpenAI, ctx, config, UnknownEventPolicy::default())?;
/// ```
pub fn create_engine(
    flavor: BackendFlavor,
    ctx: SessionContext,
    config: Arc<OpenAIConfig>,
    policy: UnknownEventPolicy,
) -> RealtimeResult<SharedEngine> {
    match flavor {
        BackendFlavor::OpenAI => Ok(Arc::new(OpenAIRealtime::new(ctx, config, policy)?)),
    }
}

/// Names of all supported backend flavors.
pub fn get_supported_flavors() -> Vec<&'static str> {
    BackendFlavor::all().iter().map(BackendFlavor::as_str).collect()
}
