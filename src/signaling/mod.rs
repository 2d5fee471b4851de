//! Telephony signaling boundary.
//!
//! The switch's management interface is reached through [`SignalingClient`].
//! Only [`SignalingClient::execute`] is transport specific; the commands the
//! gateway issues are provided on top of it:
//!
//! | Command                | Used for                                  |
//! |------------------------|-------------------------------------------|
//! | `ua_session_reply`     | rejecting an INVITE (488 / 404 / 500)     |
//! | `ua_session_update`    | REFER, to transfer a call                 |
//! | `ua_session_terminate` | hanging up a call the engine ended        |
//! | `event_subscribe`      | receiving `E_UA_SESSION` events           |
//!
//! Inbound events are decoded in [`events`] and received by [`listener`].

pub mod events;
pub mod listener;
pub mod mi;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

pub use events::{EventDispatcher, SignalingEvent};
pub use listener::EventListener;
pub use mi::MiDatagramClient;

/// Event carrying user-agent session notifications.
pub const UA_SESSION_EVENT: &str = "E_UA_SESSION";

/// Errors raised by the signaling collaborator.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply within the configured timeout
    #[error("Command {0} timed out")]
    Timeout(String),

    /// The switch answered with a JSON-RPC error
    #[error("Command {method} failed ({code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Reply could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for signaling operations.
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Commands toward the telephony switch.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Run a management command and return its result.
    async fn execute(&self, method: &str, params: Value) -> SignalingResult<Value>;

    /// Answer a pending request of dialog `key`.
    async fn reply(&self, key: &str, method: &str, code: u16, reason: &str) -> SignalingResult<()> {
        self.execute(
            "ua_session_reply",
            json!({ "key": key, "method": method, "code": code, "reason": reason }),
        )
        .await
        .map(|_| ())
    }

    /// Send a REFER within dialog `key`.
    async fn refer(&self, key: &str, refer_to: &str, referred_by: &str) -> SignalingResult<()> {
        self.execute(
            "ua_session_update",
            json!({
                "key": key,
                "method": "REFER",
                "body": "",
                "extra_headers": format!("Refer-To: <{refer_to}>\r\nReferred-By: {referred_by}\r\n"),
            }),
        )
        .await
        .map(|_| ())
    }

    /// Hang up dialog `key`.
    async fn terminate(&self, key: &str) -> SignalingResult<()> {
        self.execute("ua_session_terminate", json!({ "key": key }))
            .await
            .map(|_| ())
    }

    /// Subscribe `socket` to `event`. An `expire` of 0 unsubscribes.
    async fn subscribe(&self, event: &str, socket: &str, expire: Option<u64>) -> SignalingResult<()> {
        let params = match expire {
            Some(expire) => json!([event, socket, expire]),
            None => json!([event, socket]),
        };
        self.execute("event_subscribe", params).await.map(|_| ())
    }
}

/// Shared handle to the signaling collaborator.
pub type SharedSignaling = Arc<dyn SignalingClient>;
