//! OpenAI Realtime API session implementation.
//!
//! This module provides the OpenAI session that implements the [`AiEngine`]
//! trait using OpenAI's WebSocket-based Realtime API.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 A-law or µ-law at 8 kHz, base64 encoded
//!
//! # Session flow
//!
//! 1. Connect with `Authorization: Bearer <key>` and `OpenAI-Beta: realtime=v1`.
//! 2. Wait for the first server frame (`session.created`).
//! 3. Send `session.update`, then `response.create` when a welcome message is
//!    configured.
//! 4. Run response cycles until the call is terminated, the session is
//!    closed, or a cycle ends on an event type the session does not handle.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::OpenAIConfig;
use super::messages::{
    ClientEvent, EventType, SessionConfig, ServerEvent, TOOL_TERMINATE_CALL, TOOL_TRANSFER_CALL,
};
use crate::core::codec::ParseOutput;
use crate::core::realtime::base::{
    AiEngine, AtomicSessionState, BackendFlavor, CycleEnd, RealtimeError, RealtimeResult,
    SessionContext, SessionState, UnknownEventPolicy,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// One inbound frame, or the reason there is none.
enum Inbound {
    Text(String),
    /// The backend closed the connection
    Closed,
    /// [`AiEngine::close`] was called
    Cancelled,
}

// =============================================================================
// OpenAI Realtime Session
// =============================================================================

/// OpenAI Realtime session bound to one call.
///
/// The write half of the WebSocket lives behind a mutex so caller audio can
/// be sent while [`AiEngine::start`] owns the read half.
pub struct OpenAIRealtime {
    ctx: SessionContext,
    config: Arc<OpenAIConfig>,
    policy: UnknownEventPolicy,
    state: AtomicSessionState,
    writer: Mutex<Option<WsSink>>,
    cancel: CancellationToken,
}

impl OpenAIRealtime {
    /// Create a session for the call described by `ctx`.
    pub fn new(
        ctx: SessionContext,
        config: Arc<OpenAIConfig>,
        policy: UnknownEventPolicy,
    ) -> RealtimeResult<Self> {
        if config.api_key.as_ref().is_none_or(|k| k.is_empty()) {
            return Err(RealtimeError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ));
        }

        Ok(Self {
            ctx,
            config,
            policy,
            state: AtomicSessionState::default(),
            writer: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Session context of the owning call.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    async fn connect(&self) -> RealtimeResult<WsStream> {
        let url = self.config.ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(format!("Invalid URL {url}: {e}")))?;

        let key = self.config.api_key.as_deref().map(String::as_str).unwrap_or_default();
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert("Authorization", bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::SessionSetup(format!("Connect to {url} failed: {e}")))?;
        Ok(stream)
    }

    /// Connect, handshake and drive response cycles.
    async fn run(&self) -> RealtimeResult<()> {
        if !self.state.advance(SessionState::Connecting) {
            return Ok(());
        }

        info!(call_key = %self.ctx.key, url = %self.config.ws_url(), "Connecting to OpenAI Realtime API");
        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            stream = self.connect() => stream?,
        };

        let (sink, mut reader) = stream.split();
        {
            let mut writer = self.writer.lock().await;
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            *writer = Some(sink);
        }

        match self.next_frame(&mut reader).await {
            Ok(Inbound::Text(text)) => trace!(call_key = %self.ctx.key, "Initial frame: {}", text),
            Ok(Inbound::Cancelled) => return Ok(()),
            Ok(Inbound::Closed) => {
                info!(call_key = %self.ctx.key, "OpenAI closed the connection before the session started");
                return Err(RealtimeError::SessionSetup(
                    "connection closed before session was created".to_string(),
                ));
            }
            Err(e) => return Err(RealtimeError::SessionSetup(e.to_string())),
        }

        self.handshake()
            .await
            .map_err(|e| RealtimeError::SessionSetup(e.to_string()))?;
        self.state.advance(SessionState::HandshakeSent);

        self.state.advance(SessionState::Streaming);
        while !self.ctx.is_terminated() && !self.cancel.is_cancelled() {
            match self.response_cycle(&mut reader).await? {
                CycleEnd::ResponseDone => {
                    debug!(call_key = %self.ctx.key, "Response cycle complete");
                }
                CycleEnd::UnknownEvent(event_type) => {
                    info!(
                        call_key = %self.ctx.key,
                        event_type = %event_type,
                        "Unhandled event ended the session"
                    );
                    break;
                }
                CycleEnd::Cancelled => break,
            }
        }

        Ok(())
    }

    async fn handshake(&self) -> RealtimeResult<()> {
        let session = SessionConfig::from_config(&self.config, self.ctx.codec.backend_format());
        self.send_event(&ClientEvent::SessionUpdate { session }).await?;

        if let Some(welcome) = self.config.welcome_message.as_deref() {
            self.send_event(&ClientEvent::welcome(welcome)).await?;
        }
        Ok(())
    }

    /// Read and dispatch frames until `response.done` or an unhandled type.
    async fn response_cycle(&self, reader: &mut WsSource) -> RealtimeResult<CycleEnd> {
        let mut leftover: Vec<u8> = Vec::new();

        loop {
            let text = match self.next_frame(reader).await? {
                Inbound::Text(text) => text,
                Inbound::Cancelled => return Ok(CycleEnd::Cancelled),
                Inbound::Closed => {
                    return Err(RealtimeError::ConnectionFailed(
                        "connection closed by OpenAI".to_string(),
                    ));
                }
            };

            let event: ServerEvent = serde_json::from_str(&text)
                .map_err(|e| RealtimeError::ProtocolError(format!("{e}: {text}")))?;

            match event {
                ServerEvent::AudioDelta { delta } => {
                    let codec = self.ctx.codec.clone();
                    let prev = std::mem::take(&mut leftover);
                    let out = offload(move || {
                        let media = ServerEvent::decode_audio(&delta)
                            .map_err(|e| RealtimeError::ProtocolError(e.to_string()))?;
                        Ok(codec.parse(Some(&media), &prev))
                    })
                    .await?;
                    leftover = out.leftover;
                    trace!(call_key = %self.ctx.key, packets = out.packets.len(), "Audio delta");
                    self.ctx.relay.extend(out.packets);
                }

                ServerEvent::AudioDone {} => {
                    if !leftover.is_empty() {
                        let codec = self.ctx.codec.clone();
                        let prev = std::mem::take(&mut leftover);
                        let out: ParseOutput = offload(move || Ok(codec.parse(None, &prev))).await?;
                        self.ctx.relay.extend(out.packets);
                    }
                }

                ServerEvent::ConversationItemCreated { item } => {
                    if item.is_completed() {
                        let dropped = self.ctx.relay.drain();
                        if dropped > 0 {
                            info!(call_key = %self.ctx.key, "Dropping {} packets", dropped);
                        }
                    }
                }

                ServerEvent::TranscriptionCompleted { transcript } => {
                    info!(call_key = %self.ctx.key, "Speaker: {}", transcript.trim_end());
                }

                ServerEvent::AudioTranscriptDone { transcript } => {
                    info!(call_key = %self.ctx.key, "Engine: {}", transcript);
                }

                ServerEvent::FunctionCallArgumentsDone { name, call_id, .. } => {
                    debug!(call_key = %self.ctx.key, call_id = %call_id, "Function call: {}", name);
                    match name.as_str() {
                        TOOL_TERMINATE_CALL => {
                            info!(call_key = %self.ctx.key, "Engine requested call termination");
                            self.ctx.terminate();
                        }
                        TOOL_TRANSFER_CALL => self.transfer(),
                        other => warn!(call_key = %self.ctx.key, "Unknown function call: {}", other),
                    }
                }

                ServerEvent::Error { error } => {
                    error!(
                        call_key = %self.ctx.key,
                        "OpenAI Realtime error: {} - {}",
                        error.error_type,
                        error.message
                    );
                }

                ServerEvent::ResponseDone {} => return Ok(CycleEnd::ResponseDone),

                ServerEvent::Other => {
                    let event_type = serde_json::from_str::<EventType>(&text)
                        .map(|t| t.event_type)
                        .unwrap_or_default();
                    match self.policy {
                        UnknownEventPolicy::EndSession => {
                            return Ok(CycleEnd::UnknownEvent(event_type));
                        }
                        UnknownEventPolicy::Ignore => {
                            debug!(call_key = %self.ctx.key, "Ignoring event {}", event_type);
                        }
                    }
                }
            }
        }
    }

    /// Issue a REFER for the peer dialog without waiting for the result.
    fn transfer(&self) {
        let Some(target) = self.config.transfer_to.clone() else {
            warn!(call_key = %self.ctx.key, "Transfer requested but no transfer target is configured");
            return;
        };
        let referrer = self
            .config
            .referrer(self.ctx.to.as_deref())
            .unwrap_or_default()
            .to_string();
        let signaling = self.ctx.signaling.clone();
        let peer_key = self.ctx.peer_key.clone();

        info!(call_key = %self.ctx.key, target = %target, "Transferring call");
        tokio::spawn(async move {
            if let Err(e) = signaling.refer(&peer_key, &target, &referrer).await {
                error!(call_key = %peer_key, "Failed to transfer call: {}", e);
            }
        });
    }

    async fn next_frame(&self, reader: &mut WsSource) -> RealtimeResult<Inbound> {
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(Inbound::Cancelled),
                msg = reader.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(Inbound::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    debug!(call_key = %self.ctx.key, "WebSocket closed by server: {:?}", frame);
                    return Ok(Inbound::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(RealtimeError::WebSocketError(e.to_string())),
                None => return Ok(Inbound::Closed),
            }
        }
    }

    async fn send_event(&self, event: &ClientEvent) -> RealtimeResult<()> {
        let json = serde_json::to_string(event)
            .map_err(|e| RealtimeError::SerializationError(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RealtimeError::NotConnected)?;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }
}

/// Run CPU-bound decode work on the blocking pool.
async fn offload<F>(work: F) -> RealtimeResult<ParseOutput>
where
    F: FnOnce() -> RealtimeResult<ParseOutput> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RealtimeError::InternalError(format!("decode task failed: {e}")))?
}

#[async_trait]
impl AiEngine for OpenAIRealtime {
    async fn start(&self) -> RealtimeResult<()> {
        let result = self.run().await;
        if let Err(e) = &result {
            error!(call_key = %self.ctx.key, "OpenAI session failed: {}. Terminating call.", e);
            self.ctx.terminate();
            self.close().await;
        }
        result
    }

    async fn send(&self, audio: Bytes) {
        if self.ctx.is_terminated() {
            return;
        }

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return;
        };

        let event = ClientEvent::audio_append(&audio);
        let result = match serde_json::to_string(&event) {
            Ok(json) => sink
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string())),
            Err(e) => Err(RealtimeError::SerializationError(e.to_string())),
        };

        if let Err(e) = result {
            error!(call_key = %self.ctx.key, "Failed to send audio: {}", e);
            self.ctx.terminate();
        }
    }

    async fn close(&self) {
        if !self.state.close() {
            return;
        }
        self.cancel.cancel();

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink
            && let Err(e) = sink.close().await
        {
            debug!(call_key = %self.ctx.key, "Error closing WebSocket: {}", e);
        }
        debug!(call_key = %self.ctx.key, "OpenAI session closed");
    }

    fn audio_format(&self) -> &'static str {
        self.ctx.codec.backend_format()
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }

    fn flavor(&self) -> BackendFlavor {
        BackendFlavor::OpenAI
    }
}
