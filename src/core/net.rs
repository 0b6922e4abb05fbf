// src/core/net.rs

//! The concrete transport: a pooled `PeerMessenger` over plain TCP, and
//! the listener loop that decodes inbound envelopes and hands them to a
//! role's dispatcher.
//!
//! The outbound side generalizes a simple connect-then-send client into
//! a per-peer connection pool, so a busy retransmitting task doesn't
//! re-dial on every attempt; the inbound side is a plain accept-loop
//! over a framed codec.

use crate::core::errors::GnsError;
use crate::core::messenger::PeerMessenger;
use crate::core::protocol::{Envelope, EnvelopeCodec, NodeId};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type PeerConn = Framed<TcpStream, EnvelopeCodec>;

/// A `PeerMessenger` backed by a lazily-established, reused TCP
/// connection per peer. A send that fails drops the cached connection
/// so the next attempt redials; it never itself retries; retrying on
/// failure is the task scheduler's job (§4.3).
pub struct TcpMessenger {
    addresses: HashMap<NodeId, SocketAddr>,
    conns: DashMap<NodeId, Arc<Mutex<Option<PeerConn>>>>,
}

impl TcpMessenger {
    pub fn new(addresses: HashMap<NodeId, SocketAddr>) -> Self {
        Self {
            addresses,
            conns: DashMap::new(),
        }
    }

    async fn connection_for(&self, peer: &NodeId) -> Arc<Mutex<Option<PeerConn>>> {
        self.conns
            .entry(peer.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

#[async_trait::async_trait]
impl PeerMessenger for TcpMessenger {
    async fn send_to(&self, peer: &NodeId, message: Envelope) {
        let Some(addr) = self.addresses.get(peer) else {
            warn!(%peer, "no known address for peer, dropping message");
            return;
        };

        let slot = self.connection_for(peer).await;
        let mut guard = slot.lock().await;

        if guard.is_none() {
            match TcpStream::connect(addr).await {
                Ok(stream) => *guard = Some(Framed::new(stream, EnvelopeCodec)),
                Err(e) => {
                    warn!(%peer, %addr, error = %e, "failed to connect to peer");
                    return;
                }
            }
        }

        if let Some(conn) = guard.as_mut() {
            if let Err(e) = conn.send(message).await {
                warn!(%peer, error = %e, "send failed, dropping connection");
                *guard = None;
            }
        }
    }
}

/// Accepts connections on `bind_addr` and hands each decoded `Envelope`
/// to `dispatch`. Runs until the listener itself fails to bind or
/// accept repeatedly; per-connection decode errors only end that one
/// connection.
pub async fn run_listener<F, Fut>(bind_addr: SocketAddr, dispatch: F) -> Result<(), GnsError>
where
    F: Fn(Envelope) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "protocol listener bound");

    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                let dispatch = dispatch.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, EnvelopeCodec);
                    while let Some(result) = framed.next().await {
                        match result {
                            Ok(envelope) => dispatch(envelope).await,
                            Err(e) => {
                                debug!(%peer_addr, error = %e, "decode error, closing connection");
                                break;
                            }
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
            }
        }
    }
}
