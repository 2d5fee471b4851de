//! Inbound user-agent session events.
//!
//! The switch publishes `E_UA_SESSION` notifications as JSON-RPC messages
//! whose `params` describe one SIP request of a dialog:
//!
//! ```json
//! {"jsonrpc": "2.0", "method": "E_UA_SESSION",
//!  "params": {"key": "…", "method": "INVITE", "body": "v=0…", "headers": "…"}}
//! ```

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::SignalingResult;
use crate::core::call::CallManager;

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(default)]
    params: Option<EventParams>,
}

#[derive(Debug, Deserialize)]
struct EventParams {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: Option<String>,
}

/// A dialog event the gateway acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// New call with its SDP offer
    Invite {
        key: String,
        sdp: String,
        headers: Option<String>,
    },
    /// Call ended by the remote side
    Bye { key: String },
    /// Any other request within a dialog
    Other { key: String, method: String },
}

impl SignalingEvent {
    /// Decode a notification datagram.
    ///
    /// Returns `Ok(None)` for notifications without `params`, `key` or
    /// `method`, and for INVITEs without a body.
    pub fn parse(datagram: &[u8]) -> SignalingResult<Option<Self>> {
        let notification: Notification = serde_json::from_slice(datagram)?;
        Ok(notification.params.and_then(Self::from_params))
    }

    fn from_params(params: EventParams) -> Option<Self> {
        let key = params.key?;
        let method = params.method?;

        match method.as_str() {
            "INVITE" => Some(Self::Invite {
                key,
                sdp: params.body?,
                headers: params.headers,
            }),
            "BYE" => Some(Self::Bye { key }),
            _ => Some(Self::Other { key, method }),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Invite { key, .. } | Self::Bye { key } | Self::Other { key, .. } => key,
        }
    }
}

/// Hands decoded events to the [`CallManager`].
///
/// Only registry changes happen inline; anything that touches the network is
/// left to tasks so a slow call setup never holds up the next datagram.
#[derive(Clone)]
pub struct EventDispatcher {
    manager: Arc<CallManager>,
}

impl EventDispatcher {
    pub fn new(manager: Arc<CallManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CallManager> {
        &self.manager
    }

    /// Apply `event` to the call registry.
    ///
    /// Registration and unregistration happen before this returns, so events
    /// for the same dialog take effect in delivery order. Network work (engine
    /// sessions, rejections, closes) runs on tasks; the returned handle is the
    /// follow-up task of this event, if it has one.
    pub fn dispatch(&self, event: SignalingEvent) -> Option<JoinHandle<()>> {
        match event {
            SignalingEvent::Invite { key, sdp, headers } => {
                info!(call_key = %key, "INVITE received");
                self.manager.handle_invite(&key, &sdp, headers.as_deref())
            }
            SignalingEvent::Bye { key } => {
                info!(call_key = %key, "BYE received");
                self.manager.handle_bye(&key)
            }
            SignalingEvent::Other { key, method } => {
                debug!(call_key = %key, method, "Ignoring dialog event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::{CallManagerConfig, EngineFactory};
    use crate::core::realtime::{
        AiEngine, BackendFlavor, RealtimeResult, SessionContext, SessionState, SharedEngine,
    };
    use crate::signaling::{SignalingClient, SignalingResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl SignalingClient for Recorder {
        async fn execute(&self, method: &str, params: Value) -> SignalingResult<Value> {
            self.commands.lock().push((method.to_string(), params));
            Ok(Value::Null)
        }
    }

    struct Idle;

    #[async_trait]
    impl AiEngine for Idle {
        async fn start(&self) -> RealtimeResult<()> {
            Ok(())
        }
        async fn send(&self, _: Bytes) {}
        async fn close(&self) {}
        fn audio_format(&self) -> &'static str {
            "g711_ulaw"
        }
        fn state(&self) -> SessionState {
            SessionState::Streaming
        }
        fn flavor(&self) -> BackendFlavor {
            BackendFlavor::OpenAI
        }
    }

    fn dispatcher() -> (EventDispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let factory: EngineFactory = Arc::new(|_: BackendFlavor, _: SessionContext| {
            Ok(Arc::new(Idle) as SharedEngine)
        });
        let manager = CallManager::new(recorder.clone(), factory, CallManagerConfig::default());
        (EventDispatcher::new(manager), recorder)
    }

    fn datagram(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_parse_invite() {
        let event = SignalingEvent::parse(&datagram(json!({
            "jsonrpc": "2.0",
            "method": "E_UA_SESSION",
            "params": {"key": "k1", "method": "INVITE", "body": "v=0", "headers": "To: <sip:1@h.com>"}
        })))
        .unwrap();

        assert_eq!(
            event,
            Some(SignalingEvent::Invite {
                key: "k1".to_string(),
                sdp: "v=0".to_string(),
                headers: Some("To: <sip:1@h.com>".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_ignores_incomplete_events() {
        for value in [
            json!({"method": "E_UA_SESSION"}),
            json!({"params": {"method": "BYE"}}),
            json!({"params": {"key": "k1"}}),
            json!({"params": {"key": "k1", "method": "INVITE"}}),
        ] {
            assert_eq!(SignalingEvent::parse(&datagram(value)).unwrap(), None);
        }
    }

    #[test]
    fn test_parse_bye_and_other() {
        let bye = SignalingEvent::parse(br#"{"params":{"key":"k1","method":"BYE"}}"#).unwrap();
        assert_eq!(bye, Some(SignalingEvent::Bye { key: "k1".to_string() }));

        let ack = SignalingEvent::parse(br#"{"params":{"key":"k1","method":"ACK"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ack.key(), "k1");
        assert!(matches!(ack, SignalingEvent::Other { method, .. } if method == "ACK"));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(SignalingEvent::parse(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_invite_then_bye() {
        let (dispatcher, recorder) = dispatcher();
        let sdp = "v=0\r\nm=audio 4000 RTP/AVP 0\r\n";

        let handle = dispatcher.dispatch(SignalingEvent::Invite {
            key: "k1".to_string(),
            sdp: sdp.to_string(),
            headers: None,
        });
        assert!(handle.is_none());
        let call = dispatcher.manager().get("k1").unwrap();
        assert_eq!(call.codec().name(), "pcmu");

        dispatcher
            .dispatch(SignalingEvent::Bye { key: "k1".to_string() })
            .unwrap()
            .await
            .unwrap();
        assert!(dispatcher.manager().get("k1").is_none());
        assert!(call.is_closed());
        assert!(recorder.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_invite_replies() {
        let (dispatcher, recorder) = dispatcher();

        dispatcher
            .dispatch(SignalingEvent::Invite {
                key: "k1".to_string(),
                sdp: "v=0\r\n".to_string(),
                headers: None,
            })
            .unwrap()
            .await
            .unwrap();

        let commands = recorder.commands.lock();
        assert_eq!(commands[0].1["code"], 488);
        assert_eq!(commands[0].1["method"], "INVITE");
    }

    #[test]
    fn test_other_events_are_not_dispatched() {
        let (dispatcher, _) = dispatcher();
        let handle = dispatcher.dispatch(SignalingEvent::Other {
            key: "k1".to_string(),
            method: "ACK".to_string(),
        });
        assert!(handle.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bye_never_overtakes_its_invite() {
        let (dispatcher, recorder) = dispatcher();
        let sdp = "v=0\r\nm=audio 4000 RTP/AVP 8\r\n";

        for i in 0..500 {
            let key = format!("k{i}");
            let invite = dispatcher.dispatch(SignalingEvent::Invite {
                key: key.clone(),
                sdp: sdp.to_string(),
                headers: None,
            });
            let bye = dispatcher.dispatch(SignalingEvent::Bye { key });
            assert!(invite.is_none());
            bye.expect("BYE finds the call").await.unwrap();
        }

        assert!(dispatcher.manager().registry().is_empty());
        assert!(recorder.commands.lock().is_empty());
    }
}
