//! Connection plumbing under the notification channel.
//!
//! A [`Connection`] is a pair of unbounded queues: frames written to
//! `outbound` reach the server, frames from the server arrive on `inbound`.
//! Dropping `outbound` closes the connection; the transport drains `inbound`
//! until the peer goes away or the receiver is dropped.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::realtime::protocol::{ClientMsg, ServerMsg};

pub type Inbound = mpsc::UnboundedReceiver<Result<ServerMsg, ClientError>>;

#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<ClientMsg>,
    pub inbound: Inbound,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the transport connection. No handshake happens here.
    async fn connect(&self, url: &str) -> Result<Connection, ClientError>;
}

/// WebSocket transport speaking JSON text frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::channel_unreachable(format!("{url}: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMsg>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let payload = match serde_json::to_string(&msg) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "[WS TRANSPORT] failed to serialize outbound frame");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(payload.into())).await {
                    debug!(error = %err, "[WS TRANSPORT] write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = in_tx.closed() => break,
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let parsed = serde_json::from_str::<ServerMsg>(text.as_str())
                                .map_err(|e| ClientError::protocol(format!("undecodable frame: {e}")));
                            if in_tx.send(parsed).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            warn!("[WS TRANSPORT] ignoring binary frame");
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        // Ping/pong are answered by tungstenite itself.
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            let _ = in_tx.send(Err(ClientError::channel_unreachable(format!(
                                "read failed: {err}"
                            ))));
                            break;
                        }
                    },
                }
            }
            debug!("[WS TRANSPORT] reader finished");
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
