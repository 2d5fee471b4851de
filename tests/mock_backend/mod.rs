//! Mock realtime backend and signaling collaborator.
//!
//! The backend accepts a single WebSocket connection, records the upgrade
//! request headers and every client frame, and sends whatever frames the
//! test pushes. It greets the client with `session.created` like the real
//! service does.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use ai_voice_connector::signaling::{SignalingClient, SignalingResult};

pub const WAIT: Duration = Duration::from_secs(3);

/// Handle to a running mock backend.
pub struct MockBackend {
    pub url: String,
    headers: Arc<Mutex<Vec<(String, String)>>>,
    to_client: mpsc::UnboundedSender<Message>,
    from_client: mpsc::UnboundedReceiver<Value>,
}

impl MockBackend {
    /// Start a backend that greets with `session.created`.
    pub async fn start() -> Self {
        Self::start_with_greeting(true).await
    }

    /// Start a backend; without a greeting it closes right after the upgrade.
    pub async fn start_with_greeting(greet: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let headers = Arc::new(Mutex::new(Vec::new()));
        let (to_client, mut outbound) = mpsc::unbounded_channel::<Message>();
        let (inbound, from_client) = mpsc::unbounded_channel::<Value>();

        let recorded = headers.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_hdr_async(stream, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let mut recorded = recorded.lock();
                for (name, value) in req.headers() {
                    recorded.push((
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    ));
                }
                Ok(resp)
            })
            .await
            .unwrap();
            let (mut write, mut read) = ws.split();

            if !greet {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            let created = json!({"type": "session.created", "session": {"id": "sess_mock"}});
            write
                .send(Message::Text(created.to_string().into()))
                .await
                .unwrap();

            loop {
                tokio::select! {
                    out = outbound.recv() => match out {
                        Some(msg) => {
                            let closing = matches!(msg, Message::Close(_));
                            if write.send(msg).await.is_err() || closing {
                                break;
                            }
                        }
                        None => break,
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                                let _ = inbound.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url,
            headers,
            to_client,
            from_client,
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Send a JSON frame to the client.
    pub fn send(&self, frame: Value) {
        self.to_client
            .send(Message::Text(frame.to_string().into()))
            .unwrap();
    }

    pub fn audio_delta(&self, audio: &[u8]) {
        self.send(json!({
            "type": "response.audio.delta",
            "response_id": "resp_1",
            "delta": BASE64_STANDARD.encode(audio),
        }));
    }

    pub fn audio_done(&self) {
        self.send(json!({"type": "response.audio.done"}));
    }

    pub fn response_done(&self) {
        self.send(json!({"type": "response.done", "response": {"status": "completed"}}));
    }

    pub fn function_call(&self, name: &str) {
        self.send(json!({
            "type": "response.function_call_arguments.done",
            "name": name,
            "call_id": "call_1",
            "arguments": "{}",
        }));
    }

    /// Close the connection from the backend side.
    pub fn close(&self) {
        let _ = self.to_client.send(Message::Close(None));
    }

    /// Next frame sent by the client.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("backend connection ended")
    }

    /// Next client frame, if one arrives within `wait`.
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Signaling collaborator that records every command.
#[derive(Default)]
pub struct RecordingSignaling {
    commands: Mutex<Vec<(String, Value)>>,
    changed: Notify,
}

impl RecordingSignaling {
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().clone()
    }

    /// Wait until at least `count` commands were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<(String, Value)> {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.changed.notified();
                if self.commands.lock().len() >= count {
                    return self.commands();
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for signaling commands")
    }
}

#[async_trait]
impl SignalingClient for RecordingSignaling {
    async fn execute(&self, method: &str, params: Value) -> SignalingResult<Value> {
        self.commands.lock().push((method.to_string(), params));
        self.changed.notify_waiters();
        Ok(Value::String("OK".to_string()))
    }
}

/// Poll `condition` until it holds.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
