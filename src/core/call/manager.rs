//! Call lifecycle management.
//!
//! The [`CallManager`] owns the call registry. It builds a [`Call`] for each
//! accepted INVITE, runs its engine session as a tracked task, and tears calls
//! down on BYE, when the engine ends the call, or at shutdown.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{Call, CallError, CallRegistry, CallResult, classify};
use crate::core::codec::choose_codec;
use crate::core::realtime::{
    BackendFlavor, OpenAIConfig, RealtimeResult, SessionContext, SharedEngine,
    UnknownEventPolicy, create_engine,
};
use crate::core::relay::RelayQueue;
use crate::core::sdp::offered_codecs;
use crate::signaling::SharedSignaling;

/// Builds the engine session for a new call.
pub type EngineFactory =
    Arc<dyn Fn(BackendFlavor, SessionContext) -> RealtimeResult<SharedEngine> + Send + Sync>;

/// Factory creating engines from the shared OpenAI configuration.
pub fn openai_factory(config: Arc<OpenAIConfig>, policy: UnknownEventPolicy) -> EngineFactory {
    Arc::new(move |flavor, ctx| create_engine(flavor, ctx, Arc::clone(&config), policy))
}

/// Settings for call classification.
#[derive(Debug, Clone)]
pub struct CallManagerConfig {
    /// Flavors selectable by the `To` user, in digit-rule order
    pub flavors: Vec<BackendFlavor>,
    /// Flavor used when the INVITE carries no `To` header
    pub default_flavor: BackendFlavor,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            flavors: BackendFlavor::all().to_vec(),
            default_flavor: BackendFlavor::default(),
        }
    }
}

/// Owner of all live calls.
pub struct CallManager {
    registry: CallRegistry,
    signaling: SharedSignaling,
    factory: EngineFactory,
    config: CallManagerConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    admission: RwLock<()>,
}

impl CallManager {
    pub fn new(
        signaling: SharedSignaling,
        factory: EngineFactory,
        config: CallManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: CallRegistry::new(),
            signaling,
            factory,
            config,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            admission: RwLock::new(()),
        })
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn signaling(&self) -> &SharedSignaling {
        &self.signaling
    }

    pub fn get(&self, key: &str) -> Option<Arc<Call>> {
        self.registry.get(key)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Create and register a call for an INVITE, and start its session.
    ///
    /// Registration completes before this returns, so a BYE handled after it
    /// always finds the call. A call already registered under `key` is
    /// replaced and closed in the background.
    pub fn create(
        self: &Arc<Self>,
        key: &str,
        sdp: &str,
        headers: Option<&str>,
    ) -> CallResult<Arc<Call>> {
        // held until the run task is tracked, so shutdown sees every admitted call
        let _admission = self.admission.read();
        if self.is_shutting_down() {
            return Err(CallError::Internal("gateway is shutting down".to_string()));
        }

        let codec = choose_codec(&offered_codecs(sdp))?;
        let caller = classify(headers, &self.config.flavors, self.config.default_flavor)?;

        let relay = Arc::new(RelayQueue::new());
        let terminated = Arc::new(AtomicBool::new(false));
        let ctx = SessionContext::new(
            key,
            Arc::clone(&codec),
            Arc::clone(&relay),
            Arc::clone(&self.signaling),
            Arc::clone(&terminated),
        )
        .with_to(caller.to.clone());
        let flavor = caller.flavor;
        let session = (self.factory)(flavor, ctx)?;

        let call = Arc::new(Call::new(
            key.to_string(),
            sdp.to_string(),
            caller,
            codec,
            relay,
            session,
            terminated,
        ));

        if let Some(previous) = self.registry.insert(Arc::clone(&call)) {
            warn!(call_key = %key, "Replacing existing call with the same key");
            self.tracker.spawn(async move {
                previous.close().await;
            });
        }

        info!(
            call_key = %key,
            codec = call.codec().name(),
            payload_type = call.codec().payload_type(),
            clock_rate = call.codec().clock_rate(),
            flavor = %flavor,
            to = call.to().unwrap_or_default(),
            "Call created"
        );

        let manager = Arc::clone(self);
        let running = Arc::clone(&call);
        self.tracker.spawn(async move { manager.run(running).await });

        Ok(call)
    }

    /// Create a call for an INVITE, or reject the INVITE when that fails.
    ///
    /// Returns the task sending the rejection, if any.
    pub fn handle_invite(
        self: &Arc<Self>,
        key: &str,
        sdp: &str,
        headers: Option<&str>,
    ) -> Option<JoinHandle<()>> {
        let e = self.create(key, sdp, headers).err()?;

        let (code, reason) = e.reply_status();
        warn!(call_key = %key, code, "Rejecting call: {}", e);
        let signaling = Arc::clone(&self.signaling);
        let key = key.to_string();
        Some(self.tracker.spawn(async move {
            if let Err(e) = signaling.reply(&key, "INVITE", code, reason).await {
                error!(call_key = %key, "Failed to reply to INVITE: {}", e);
            }
        }))
    }

    /// Unregister the call for `key` and close it in the background.
    ///
    /// The call is gone from the registry when this returns. Returns the
    /// closing task, or `None` if no call is registered under `key`.
    pub fn handle_bye(&self, key: &str) -> Option<JoinHandle<()>> {
        let Some(call) = self.registry.remove(key) else {
            debug!(call_key = %key, "No call to close");
            return None;
        };
        Some(self.tracker.spawn(async move {
            call.close().await;
            info!(call_key = %call.key(), "Call closed");
        }))
    }

    /// Close and unregister the call for `key`. Returns `false` if unknown.
    pub async fn close(&self, key: &str) -> bool {
        let Some(call) = self.registry.remove(key) else {
            debug!(call_key = %key, "No call to close");
            return false;
        };
        call.close().await;
        info!(call_key = %key, "Call closed");
        true
    }

    /// Close every call and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        {
            let _admission = self.admission.write();
            self.shutdown.cancel();
        }

        let calls = self.registry.drain_all();
        info!(calls = calls.len(), "Closing calls for shutdown");
        join_all(calls.iter().map(|call| async move {
            call.close().await;
            debug!(call_key = %call.key(), "Call closed for shutdown");
        }))
        .await;

        self.tracker.close();
        self.tracker.wait().await;
        info!("All calls closed");
    }

    async fn run(&self, call: Arc<Call>) {
        if let Err(e) = call.session().start().await {
            warn!(call_key = %call.key(), "Engine session ended with error: {}", e);
        }

        if !call.is_terminated() {
            debug!(call_key = %call.key(), "Engine session ended; call stays up");
            return;
        }

        self.registry.remove_if_same(&call);
        if call.close().await {
            info!(call_key = %call.key(), "Engine ended the call, hanging up");
            if let Err(e) = self.signaling.terminate(call.key()).await {
                error!(call_key = %call.key(), "Failed to terminate call: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::tests::StubEngine;
    use crate::core::realtime::{AiEngine, SessionState};
    use crate::signaling::{SignalingClient, SignalingResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const SDP: &str = "v=0\r\n\
        m=audio 4000 RTP/AVP 0 8\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        a=rtpmap:8 PCMA/8000\r\n";

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

    /// Engine that ends the call as soon as it starts.
    struct HangsUp(SessionContext);

    #[async_trait]
    impl AiEngine for HangsUp {
        async fn start(&self) -> RealtimeResult<()> {
            self.0.terminate();
            Ok(())
        }
        async fn send(&self, _: Bytes) {}
        async fn close(&self) {}
        fn audio_format(&self) -> &'static str {
            self.0.codec.backend_format()
        }
        fn state(&self) -> SessionState {
            SessionState::Closed
        }
        fn flavor(&self) -> BackendFlavor {
            BackendFlavor::OpenAI
        }
    }

    /// Engine whose session runs until it is closed.
    #[derive(Default)]
    struct UntilClosed {
        closed: CancellationToken,
    }

    #[async_trait]
    impl AiEngine for UntilClosed {
        async fn start(&self) -> RealtimeResult<()> {
            self.closed.cancelled().await;
            Ok(())
        }
        async fn send(&self, _: Bytes) {}
        async fn close(&self) {
            self.closed.cancel();
        }
        fn audio_format(&self) -> &'static str {
            "g711_alaw"
        }
        fn state(&self) -> SessionState {
            if self.closed.is_cancelled() {
                SessionState::Closed
            } else {
                SessionState::Streaming
            }
        }
        fn flavor(&self) -> BackendFlavor {
            BackendFlavor::OpenAI
        }
    }

    fn until_closed_factory() -> EngineFactory {
        Arc::new(|_: BackendFlavor, _: SessionContext| {
            Ok(Arc::new(UntilClosed::default()) as SharedEngine)
        })
    }

    fn stub_factory() -> EngineFactory {
        Arc::new(|_: BackendFlavor, _: SessionContext| {
            Ok(Arc::new(StubEngine::default()) as SharedEngine)
        })
    }

    fn manager(factory: EngineFactory) -> (Arc<CallManager>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let manager = CallManager::new(
            recorder.clone(),
            factory,
            CallManagerConfig::default(),
        );
        (manager, recorder)
    }

    #[tokio::test]
    async fn test_create_negotiates_pcma() {
        let (manager, _) = manager(stub_factory());
        let call = manager.create("k1", SDP, None).unwrap();

        assert_eq!(call.codec().name(), "pcma");
        assert_eq!(call.flavor(), BackendFlavor::OpenAI);
        assert!(manager.get("k1").is_some());
    }

    #[tokio::test]
    async fn test_unsupported_codec_is_rejected_with_488() {
        let (manager, recorder) = manager(stub_factory());
        let sdp = "v=0\r\nm=audio 4000 RTP/AVP 18\r\na=rtpmap:18 G729/8000\r\n";

        manager.handle_invite("k1", sdp, None).unwrap().await.unwrap();

        assert!(manager.registry().is_empty());
        let commands = recorder.commands.lock();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "ua_session_reply");
        assert_eq!(commands[0].1["code"], 488);
        assert_eq!(commands[0].1["reason"], "Not Acceptable Here");
    }

    #[tokio::test]
    async fn test_unknown_caller_is_rejected_with_404() {
        let (manager, recorder) = manager(stub_factory());
        let headers = "To: <sip:example.com>\r\n";

        manager.handle_invite("k1", SDP, Some(headers)).unwrap().await.unwrap();

        assert!(manager.registry().is_empty());
        assert_eq!(recorder.commands.lock()[0].1["code"], 404);
    }

    #[tokio::test]
    async fn test_engine_failure_is_rejected_with_500() {
        let factory: EngineFactory = Arc::new(|_: BackendFlavor, _: SessionContext| {
            Err(crate::core::realtime::RealtimeError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ))
        });
        let (manager, recorder) = manager(factory);

        manager.handle_invite("k1", SDP, None).unwrap().await.unwrap();

        assert!(manager.registry().is_empty());
        assert_eq!(recorder.commands.lock()[0].1["code"], 500);
    }

    #[tokio::test]
    async fn test_close_removes_call() {
        let (manager, recorder) = manager(stub_factory());
        let call = manager.create("k1", SDP, None).unwrap();

        assert!(manager.close("k1").await);
        assert!(!manager.close("k1").await);
        assert!(call.is_closed());
        assert!(manager.registry().is_empty());

        manager.shutdown().await;
        assert!(recorder.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_key_closes_previous_call() {
        let (manager, _) = manager(stub_factory());
        let first = manager.create("k1", SDP, None).unwrap();
        let second = manager.create("k1", SDP, None).unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !first.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(&manager.get("k1").unwrap(), &second));
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_hang_up_terminates_dialog() {
        let factory: EngineFactory = Arc::new(|_: BackendFlavor, ctx: SessionContext| {
            Ok(Arc::new(HangsUp(ctx)) as SharedEngine)
        });
        let (manager, recorder) = manager(factory);

        let call = manager.create("k1", SDP, None).unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !manager.registry().is_empty() || recorder.commands.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(call.is_terminated());
        assert!(manager.registry().is_empty());
        let commands = recorder.commands.lock();
        assert_eq!(
            commands.as_slice(),
            &[("ua_session_terminate".to_string(), json!({"key": "k1"}))]
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_calls() {
        let engine = Arc::new(StubEngine::default());
        let shared = engine.clone();
        let factory: EngineFactory = Arc::new(move |_: BackendFlavor, _: SessionContext| {
            Ok(shared.clone() as SharedEngine)
        });
        let (manager, _) = manager(factory);

        manager.create("k1", SDP, None).unwrap();
        manager.create("k2", SDP, None).unwrap();
        manager.shutdown().await;

        assert!(manager.registry().is_empty());
        assert_eq!(engine.closes.load(Ordering::SeqCst), 2);
        assert!(manager.create("k3", SDP, None).is_err());
    }

    #[tokio::test]
    async fn test_bye_right_after_invite_closes_call() {
        let (manager, recorder) = manager(until_closed_factory());

        assert!(manager.handle_invite("k1", SDP, None).is_none());
        let call = manager.get("k1").expect("registered before handle_invite returns");

        manager.handle_bye("k1").unwrap().await.unwrap();
        assert!(call.is_closed());
        assert!(manager.registry().is_empty());
        assert!(manager.handle_bye("k1").is_none());

        tokio::time::timeout(Duration::from_secs(1), manager.shutdown())
            .await
            .unwrap();
        assert!(recorder.commands.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_during_creates_closes_every_call() {
        let (manager, _) = manager(until_closed_factory());

        let creators: Vec<_> = (0..64)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    manager.create(&format!("k{i}"), SDP, None).ok()
                })
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown waits only for admitted calls");

        for creator in creators {
            if let Some(call) = creator.await.unwrap() {
                assert!(call.is_closed());
            }
        }
        assert!(manager.registry().is_empty());
    }
}
