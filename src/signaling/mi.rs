//! Datagram management-interface client.
//!
//! Commands are JSON-RPC 2.0 requests sent over UDP to the switch's
//! management socket. Each request uses its own ephemeral socket so replies
//! of concurrent commands cannot be confused.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use super::{SignalingClient, SignalingError, SignalingResult};

/// Largest datagram accepted as a reply.
const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC over UDP client for the switch's management interface.
#[derive(Debug)]
pub struct MiDatagramClient {
    addr: SocketAddr,
    timeout: Duration,
    next_id: AtomicU64,
}

impl MiDatagramClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Resolve `host:port` and create a client for it.
    pub async fn resolve(host: &str, port: u16, timeout: Duration) -> SignalingResult<Self> {
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| {
                SignalingError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot resolve {host}:{port}"),
                ))
            })?;
        Ok(Self::new(addr, timeout))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn round_trip(&self, socket: &UdpSocket, id: u64, method: &str) -> SignalingResult<Value> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = socket.recv(&mut buf).await?;
            let response: RpcResponse = serde_json::from_slice(&buf[..len])
                .map_err(|e| SignalingError::InvalidResponse(e.to_string()))?;

            if response.id.is_some_and(|rid| rid != id) {
                trace!(method, "Discarding stale reply {:?}", response.id);
                continue;
            }

            if let Some(error) = response.error {
                return Err(SignalingError::Rpc {
                    method: method.to_string(),
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

#[async_trait]
impl SignalingClient for MiDatagramClient {
    async fn execute(&self, method: &str, params: Value) -> SignalingResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&RpcRequest {
            jsonrpc: "2.0",
            method,
            params: &params,
            id,
        })?;

        let bind: SocketAddr = if self.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(self.addr).await?;
        socket.send(&payload).await?;
        debug!(method, id, addr = %self.addr, "MI command sent");

        tokio::time::timeout(self.timeout, self.round_trip(&socket, id, method))
            .await
            .map_err(|_| SignalingError::Timeout(method.to_string()))?
    }
}
