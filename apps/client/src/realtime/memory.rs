//! In-process transport.
//!
//! Each `connect` hands the server side of the link to a [`MemoryServer`],
//! which scripts replies frame by frame. Used by the crate's tests and by
//! embedders that want to drive the channel without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::realtime::protocol::{ClientMsg, ServerMsg};
use crate::realtime::transport::{Connection, Transport};

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accepted: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
    refuse: Arc<AtomicBool>,
}

/// Server side of one connection.
#[derive(Debug)]
pub struct MemoryPeer {
    pub url: String,
    from_client: mpsc::UnboundedReceiver<ClientMsg>,
    to_client: mpsc::UnboundedSender<Result<ServerMsg, ClientError>>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refuse = Arc::new(AtomicBool::new(false));
        (
            Self {
                accepted: tx,
                refuse: refuse.clone(),
            },
            MemoryServer {
                accepted: rx,
                refuse,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ClientError::channel_unreachable(format!(
                "{url}: connection refused"
            )));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            from_client: out_rx,
            to_client: in_tx,
        };
        self.accepted
            .send(peer)
            .map_err(|_| ClientError::channel_unreachable(format!("{url}: server gone")))?;

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

impl MemoryServer {
    /// Next accepted connection, or `None` once every transport is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Accepted connection, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.try_recv().ok()
    }

    /// Make subsequent connects fail as unreachable.
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl MemoryPeer {
    /// Next frame from the client; `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<ClientMsg> {
        self.from_client.recv().await
    }

    /// Push a frame to the client. Returns `false` if it is gone.
    pub fn send(&self, msg: ServerMsg) -> bool {
        self.to_client.send(Ok(msg)).is_ok()
    }

    /// Push a transport-level error to the client.
    pub fn send_error(&self, err: ClientError) -> bool {
        self.to_client.send(Err(err)).is_ok()
    }

    /// Whether the client dropped its outbound half.
    pub fn is_client_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}
