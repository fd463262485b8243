//! Notification channel state machine.
//!
//! ```text
//! disconnected ──open──▶ connecting ──hello_ack──▶ connected
//!      ▲                     │                        │
//!      │                     └──reject/timeout──▶ failed ◀── connection lost
//!      └──────────────────── close (from any state) ──┘
//! ```
//!
//! Every `open` starts a new session generation. Completions that belong to
//! an older generation (an open raced by `close`, or a reader draining a dead
//! connection) are dropped without touching state.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::realtime::protocol::{ClientMsg, ServerMsg, PROTOCOL_VERSION};
use crate::realtime::transport::{Connection, Inbound, Transport};

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;
pub type CommandHandler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    /// Bound on connect + handshake.
    pub handshake_timeout: Duration,
    /// Bound on waiting for a subscription ack.
    pub request_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

type PendingReply = oneshot::Sender<Result<(), ClientError>>;

#[derive(Default)]
struct Session {
    generation: u64,
    conn_id: Option<Uuid>,
    cancel: CancellationToken,
    outbound: Option<tokio::sync::mpsc::UnboundedSender<ClientMsg>>,
    reader: Option<JoinHandle<()>>,
    user_id: Option<String>,
    next_request_id: u64,
    subscriptions: HashMap<String, EventHandler>,
    commands: HashMap<String, CommandHandler>,
    pending: HashMap<u64, (String, PendingReply)>,
}

impl Session {
    /// Drop everything tied to the current connection. Pending requests see
    /// their reply sender dropped and fail with `ChannelClosed`.
    fn teardown(&mut self, abort_reader: bool) {
        self.cancel.cancel();
        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            if abort_reader {
                reader.abort();
            }
        }
        self.conn_id = None;
        self.user_id = None;
        self.subscriptions.clear();
        self.commands.clear();
        self.pending.clear();
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    session: Mutex<Session>,
    state: watch::Sender<ChannelState>,
}

/// Handle to the notification channel. Clones share one underlying session.
#[derive(Clone)]
pub struct NotificationChannel {
    shared: Arc<Shared>,
}

impl NotificationChannel {
    pub fn new(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                session: Mutex::new(Session::default()),
                state,
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// User id the server reported in its handshake ack.
    pub fn user_id(&self) -> Option<String> {
        self.shared.session.lock().user_id.clone()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Connect and authenticate with `token`.
    ///
    /// Any previous session is torn down first, including its subscriptions
    /// and command handlers. Returns [`ClientError::ChannelClosed`] if
    /// [`close`](Self::close) (or another `open`) overtook this attempt.
    pub async fn open(&self, token: &str) -> Result<(), ClientError> {
        let conn_id = Uuid::new_v4();
        let (generation, cancel) = {
            let mut session = self.shared.session.lock();
            session.teardown(true);
            session.generation += 1;
            session.cancel = CancellationToken::new();
            session.conn_id = Some(conn_id);
            self.shared.state.send_replace(ChannelState::Connecting);
            (session.generation, session.cancel.clone())
        };
        info!(conn_id = %conn_id, url = %self.shared.config.url, "[CHANNEL] connecting");

        let timeout = self.shared.config.handshake_timeout;
        let attempt = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::ChannelClosed),
            result = tokio::time::timeout(timeout, self.handshake(token)) => match result {
                Ok(result) => result,
                Err(_) => Err(ClientError::channel_timeout(
                    timeout.as_millis() as u64,
                    "connect and handshake",
                )),
            },
        };

        let mut session = self.shared.session.lock();
        if session.generation != generation {
            debug!(conn_id = %conn_id, "[CHANNEL] open superseded; dropping result");
            return Err(ClientError::ChannelClosed);
        }

        match attempt {
            Ok((connection, user_id)) => {
                let Connection { outbound, inbound } = connection;
                session.outbound = Some(outbound);
                session.user_id = user_id;
                session.reader = Some(tokio::spawn(read_loop(
                    Arc::downgrade(&self.shared),
                    generation,
                    conn_id,
                    inbound,
                )));
                self.shared.state.send_replace(ChannelState::Connected);
                info!(conn_id = %conn_id, user_id = ?session.user_id, "[CHANNEL] connected");
                Ok(())
            }
            Err(err) => {
                session.teardown(true);
                self.shared.state.send_replace(ChannelState::Failed);
                warn!(conn_id = %conn_id, code = err.code(), error = %err, "[CHANNEL] open failed");
                Err(err)
            }
        }
    }

    /// Subscribe to `topic`. Only valid while connected; this does not queue.
    ///
    /// Resolves once the server acknowledges. `on_event` runs once per
    /// published event, in arrival order.
    pub async fn subscribe<F>(&self, topic: &str, on_event: F) -> Result<(), ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let (generation, id, reply) = {
            let mut session = self.shared.session.lock();
            if self.state() != ChannelState::Connected {
                return Err(ClientError::NotConnected);
            }
            let outbound = session.outbound.clone().ok_or(ClientError::NotConnected)?;

            session.next_request_id += 1;
            let id = session.next_request_id;
            outbound
                .send(ClientMsg::Subscribe {
                    id,
                    topic: topic.to_string(),
                })
                .map_err(|_| ClientError::ChannelClosed)?;

            let (tx, rx) = oneshot::channel();
            session.pending.insert(id, (topic.to_string(), tx));
            session
                .subscriptions
                .insert(topic.to_string(), Arc::new(on_event));
            (session.generation, id, rx)
        };

        let timeout = self.shared.config.request_timeout;
        let outcome = match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ChannelClosed),
            Err(_) => Err(ClientError::channel_timeout(
                timeout.as_millis() as u64,
                format!("subscribe to {topic}"),
            )),
        };

        match &outcome {
            Ok(()) => debug!(topic, "[CHANNEL] subscribed"),
            Err(err) => {
                let mut session = self.shared.session.lock();
                if session.generation == generation {
                    session.pending.remove(&id);
                    session.subscriptions.remove(topic);
                }
                warn!(topic, code = err.code(), error = %err, "[CHANNEL] subscribe failed");
            }
        }
        outcome
    }

    /// Stop delivering `topic`. Fire-and-forget towards the server.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        let mut session = self.shared.session.lock();
        let outbound = session.outbound.clone().ok_or(ClientError::NotConnected)?;
        session.subscriptions.remove(topic);
        outbound
            .send(ClientMsg::Unsubscribe {
                topic: topic.to_string(),
            })
            .map_err(|_| ClientError::ChannelClosed)
    }

    /// Handle inbound commands named `name`. Only valid while connected.
    ///
    /// One handler per name: registering again replaces the previous one.
    /// Handlers live until the session ends (close, reopen, or lost
    /// connection), so a registration outside a live session would never
    /// run and is refused.
    pub fn on_command<F>(&self, name: &str, handler: F) -> Result<(), ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut session = self.shared.session.lock();
        if self.state() != ChannelState::Connected {
            return Err(ClientError::NotConnected);
        }
        if session
            .commands
            .insert(name.to_string(), Arc::new(handler))
            .is_some()
        {
            debug!(command = name, "[CHANNEL] replaced command handler");
        }
        Ok(())
    }

    /// Tear down the connection and forget subscriptions and handlers.
    ///
    /// Safe in any state; an open in flight completes as a no-op.
    pub fn close(&self) {
        let mut session = self.shared.session.lock();
        let was_active = session.outbound.is_some() || self.state() == ChannelState::Connecting;
        session.teardown(true);
        session.generation += 1;
        self.shared.state.send_replace(ChannelState::Disconnected);
        if was_active {
            info!("[CHANNEL] closed");
        }
    }

    async fn handshake(&self, token: &str) -> Result<(Connection, Option<String>), ClientError> {
        let mut connection = self.shared.transport.connect(&self.shared.config.url).await?;

        connection
            .outbound
            .send(ClientMsg::Hello {
                protocol: PROTOCOL_VERSION,
                token: token.to_string(),
            })
            .map_err(|_| ClientError::channel_unreachable("connection closed before hello"))?;

        match connection.inbound.recv().await {
            Some(Ok(ServerMsg::HelloAck { protocol, user_id })) => {
                if protocol != PROTOCOL_VERSION {
                    return Err(ClientError::protocol(format!(
                        "server speaks protocol {protocol}, expected {PROTOCOL_VERSION}"
                    )));
                }
                Ok((connection, user_id))
            }
            Some(Ok(ServerMsg::Error { code, message, .. })) => Err(
                ClientError::channel_auth_rejected(format!("{}: {message}", code.as_str())),
            ),
            Some(Ok(other)) => Err(ClientError::protocol(format!(
                "expected hello_ack, got {other:?}"
            ))),
            Some(Err(err)) => Err(err),
            None => Err(ClientError::channel_unreachable(
                "connection closed during handshake",
            )),
        }
    }
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn dispatch(&self, generation: u64, msg: ServerMsg) {
        // Resolve the target under the lock, run it outside: handlers may
        // call back into the channel.
        let delivery = {
            let mut session = self.session.lock();
            if session.generation != generation {
                return;
            }
            match msg {
                ServerMsg::Publish { topic, data } => match session.subscriptions.get(&topic) {
                    Some(handler) => Some((handler.clone(), data)),
                    None => {
                        debug!(topic = %topic, "[CHANNEL] event for unsubscribed topic");
                        None
                    }
                },
                ServerMsg::Cmd { cmd, payload } => match session.commands.get(&cmd) {
                    Some(handler) => Some((handler.clone(), payload)),
                    None => {
                        debug!(command = %cmd, "[CHANNEL] no handler for command");
                        None
                    }
                },
                ServerMsg::Ack { id } => {
                    if let Some((_, reply)) = session.pending.remove(&id) {
                        let _ = reply.send(Ok(()));
                    }
                    None
                }
                ServerMsg::Error {
                    id: Some(id),
                    code,
                    message,
                } => {
                    if let Some((topic, reply)) = session.pending.remove(&id) {
                        let _ = reply.send(Err(ClientError::subscription_rejected(
                            topic,
                            format!("{}: {message}", code.as_str()),
                        )));
                    }
                    None
                }
                ServerMsg::Error {
                    id: None,
                    code,
                    message,
                } => {
                    warn!(code = code.as_str(), message = %message, "[CHANNEL] server error");
                    None
                }
                ServerMsg::HelloAck { .. } => {
                    debug!("[CHANNEL] ignoring repeated hello_ack");
                    None
                }
            }
        };

        if let Some((handler, payload)) = delivery {
            handler(payload);
        }
    }

    fn connection_lost(&self, generation: u64, conn_id: Uuid) {
        let mut session = self.session.lock();
        if session.generation != generation {
            return;
        }
        // The reader is the caller; let it finish on its own.
        session.teardown(false);
        self.state.send_replace(ChannelState::Failed);
        warn!(conn_id = %conn_id, "[CHANNEL] connection lost");
    }
}

async fn read_loop(shared: Weak<Shared>, generation: u64, conn_id: Uuid, mut inbound: Inbound) {
    while let Some(frame) = inbound.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match frame {
            Ok(msg) => shared.dispatch(generation, msg),
            Err(err) => {
                warn!(conn_id = %conn_id, code = err.code(), error = %err, "[CHANNEL] bad inbound frame")
            }
        }
    }

    if let Some(shared) = shared.upgrade() {
        shared.connection_lost(generation, conn_id);
    }
}
