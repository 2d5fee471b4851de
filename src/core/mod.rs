pub mod call;
pub mod codec;
pub mod realtime;
pub mod relay;
pub mod sdp;

// Re-export commonly used types for convenience
pub use call::{Call, CallError, CallManager, CallManagerConfig, CallRegistry, CallResult};

pub use codec::{Codec, CodecError, OfferedCodec, SharedCodec, choose_codec};

pub use realtime::{
    AiEngine, BackendFlavor, OpenAIConfig, OpenAIRealtime, RealtimeError, RealtimeResult,
    SessionContext, SessionState, SharedEngine, UnknownEventPolicy, create_engine,
};

pub use relay::RelayQueue;
