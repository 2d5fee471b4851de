//! Event socket.
//!
//! Binds the UDP socket the switch delivers `E_UA_SESSION` notifications to,
//! keeps the subscription alive and feeds each datagram to the
//! [`EventDispatcher`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventDispatcher, SharedSignaling, SignalingEvent, SignalingResult, UA_SESSION_EVENT};

/// Subscriptions expire after an hour; renew shortly before.
pub const RESUBSCRIBE_INTERVAL: Duration = Duration::from_secs(3600 - 30);

const MAX_DATAGRAM: usize = 65_535;

pub struct EventListener {
    socket: UdpSocket,
    socket_uri: String,
    signaling: SharedSignaling,
    dispatcher: EventDispatcher,
    resubscribe_every: Duration,
}

impl EventListener {
    /// Bind the event socket on `ip:port`. Port 0 picks an ephemeral port.
    pub async fn bind(
        ip: &str,
        port: u16,
        signaling: SharedSignaling,
        dispatcher: EventDispatcher,
    ) -> SignalingResult<Self> {
        let socket = UdpSocket::bind((ip, port)).await?;
        let local = socket.local_addr()?;
        let socket_uri = format!("udp:{}:{}", ip, local.port());
        info!("Event socket listening on {}", local);

        Ok(Self {
            socket,
            socket_uri,
            signaling,
            dispatcher,
            resubscribe_every: RESUBSCRIBE_INTERVAL,
        })
    }

    pub fn with_resubscribe_interval(mut self, every: Duration) -> Self {
        self.resubscribe_every = every;
        self
    }

    pub fn local_addr(&self) -> SignalingResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Socket URI announced in subscriptions, e.g. `udp:127.0.0.1:5050`.
    pub fn socket_uri(&self) -> &str {
        &self.socket_uri
    }

    /// Subscribe and dispatch events until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut resubscribe = interval(self.resubscribe_every);
        resubscribe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = resubscribe.tick() => {
                    self.subscribe();
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                    Err(e) => warn!("Event socket receive failed: {}", e),
                },
            }
        }
        debug!("Event listener stopped");
    }

    /// Drop the subscription.
    pub async fn unsubscribe(&self) {
        match self
            .signaling
            .subscribe(UA_SESSION_EVENT, &self.socket_uri, Some(0))
            .await
        {
            Ok(()) => info!(socket = %self.socket_uri, "Unsubscribed from {}", UA_SESSION_EVENT),
            Err(e) => warn!("Failed to unsubscribe from {}: {}", UA_SESSION_EVENT, e),
        }
    }

    /// Renew the subscription on its own task so the socket keeps draining
    /// while the switch answers.
    fn subscribe(&self) -> JoinHandle<()> {
        let signaling = Arc::clone(&self.signaling);
        let socket_uri = self.socket_uri.clone();
        tokio::spawn(async move {
            match signaling.subscribe(UA_SESSION_EVENT, &socket_uri, None).await {
                Ok(()) => debug!(socket = %socket_uri, "Subscribed to {}", UA_SESSION_EVENT),
                Err(e) => warn!("Failed to subscribe to {}: {}", UA_SESSION_EVENT, e),
            }
        })
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        match SignalingEvent::parse(datagram) {
            Ok(Some(event)) => {
                self.dispatcher.dispatch(event);
            }
            Ok(None) => debug!(%peer, "Ignoring incomplete event"),
            Err(e) => warn!(%peer, "Malformed event datagram: {}", e),
        }
    }
}
