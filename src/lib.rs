pub mod config;
pub mod core;
pub mod signaling;

// Re-export commonly used items for convenience
pub use config::GatewayConfig;
pub use crate::core::*;
pub use signaling::{EventDispatcher, EventListener, MiDatagramClient, SignalingClient};
