//! Ties the credential store to the notification channel.
//!
//! On startup the persisted session is restored and, if a token exists, the
//! channel is opened with it. Afterwards every credential change (login,
//! logout, a 401 from the API, an external storage reload) re-runs [`sync`],
//! which converges the channel on the store's current token.
//!
//! [`sync`]: SessionBootstrapper::sync

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::api::RegisterRequest;
use crate::error::ClientError;
use crate::realtime::protocol::{LIKE_COMMAND, NOTIFICATIONS_TOPIC};
use crate::realtime::{open_with_retry, ChannelState, LoggingSink, NotificationSink};
use crate::state::credential_store::Credential;
use crate::state::session_context::SessionContext;

pub struct SessionBootstrapper {
    context: SessionContext,
    sink: Arc<dyn NotificationSink>,
    // Token the live channel was opened with. Also serializes syncs.
    synced_token: Mutex<Option<String>>,
}

impl SessionBootstrapper {
    pub fn new(context: SessionContext) -> Self {
        Self::with_sink(context, Arc::new(LoggingSink))
    }

    pub fn with_sink(context: SessionContext, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            context,
            sink,
            synced_token: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Restore the persisted session and bring the channel up if there is a
    /// token. Never fails: a channel that cannot open leaves the client in
    /// degraded mode, reported through the returned state.
    pub async fn start(&self) -> ChannelState {
        let credential = self.context.credentials.initialize().await;
        info!(
            authenticated = credential.is_authenticated(),
            "[BOOTSTRAP] starting session"
        );

        match self.sync().await {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    code = err.code(),
                    error = %err,
                    "[BOOTSTRAP] notifications unavailable; continuing without them"
                );
                self.context.channel.state()
            }
        }
    }

    /// Converge the channel on the store's current token.
    ///
    /// With a token: open (unless already connected with that same token),
    /// register the `like` command and subscribe to notifications. Without
    /// one: close.
    pub async fn sync(&self) -> Result<ChannelState, ClientError> {
        let channel = &self.context.channel;

        // Closing first cancels an open still in flight under the lock.
        if self.context.credentials.token().is_none() {
            channel.close();
        }
        let mut synced = self.synced_token.lock().await;

        let Some(token) = self.context.credentials.token() else {
            if synced.take().is_some() || channel.state() != ChannelState::Disconnected {
                debug!("[BOOTSTRAP] no token; closing channel");
            }
            channel.close();
            return Ok(ChannelState::Disconnected);
        };

        if synced.as_deref() == Some(token.as_str()) && channel.state() == ChannelState::Connected
        {
            return Ok(ChannelState::Connected);
        }

        *synced = None;
        let opened =
            open_with_retry(channel, &self.context.credentials, &self.context.config.reconnect)
                .await;
        if self.superseded(&token) {
            return Ok(self.abandon());
        }
        opened?;

        let sink = self.sink.clone();
        let subscribed = match channel
            .on_command(LIKE_COMMAND, move |payload: Value| sink.on_like(payload))
        {
            Ok(()) => {
                let sink = self.sink.clone();
                channel
                    .subscribe(NOTIFICATIONS_TOPIC, move |event: Value| {
                        sink.on_notification(event)
                    })
                    .await
            }
            Err(err) => Err(err),
        };
        if self.superseded(&token) {
            return Ok(self.abandon());
        }
        subscribed?;

        *synced = Some(token);
        info!(user_id = ?channel.user_id(), "[BOOTSTRAP] notifications live");
        Ok(ChannelState::Connected)
    }

    /// True once the store no longer holds `token`.
    fn superseded(&self, token: &str) -> bool {
        self.context.credentials.token().as_deref() != Some(token)
    }

    // A newer sync owns the channel now; drop whatever this one opened.
    fn abandon(&self) -> ChannelState {
        debug!("[BOOTSTRAP] credentials changed during sync; dropping session");
        self.context.channel.close();
        ChannelState::Disconnected
    }

    /// Sign in and bring the channel up for the new session.
    ///
    /// The login itself succeeding is what counts: a channel failure is
    /// logged and the credential is still returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, ClientError> {
        let response = self.context.api.login(username, password).await?;
        self.context
            .credentials
            .set_auth(response.token, response.user)
            .await?;
        info!(username, "[BOOTSTRAP] logged in");
        self.sync_logged().await;
        Ok(self.context.credentials.snapshot())
    }

    /// Create an account; the server signs the new user in directly.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Credential, ClientError> {
        let response = self.context.api.register(request).await?;
        self.context
            .credentials
            .set_auth(response.token, response.user)
            .await?;
        info!(username = %request.username, "[BOOTSTRAP] registered");
        self.sync_logged().await;
        Ok(self.context.credentials.snapshot())
    }

    pub async fn logout(&self) {
        self.context.credentials.clear_auth().await;
        self.sync_logged().await;
        info!("[BOOTSTRAP] logged out");
    }

    /// Authenticated GET against the API.
    ///
    /// A 401 means the server no longer accepts the token: the session is
    /// cleared and the channel closed before the error is returned.
    pub async fn fetch(&self, path: &str) -> Result<Value, ClientError> {
        let token = self
            .context
            .credentials
            .token()
            .ok_or(ClientError::Unauthorized)?;

        match self.context.api.get_json(path, &token).await {
            Err(ClientError::Unauthorized) => {
                warn!(path, "[BOOTSTRAP] token rejected by API; clearing session");
                self.context.credentials.clear_auth().await;
                self.sync_logged().await;
                Err(ClientError::Unauthorized)
            }
            other => other,
        }
    }

    /// Spawn the background task that re-syncs on credential events and
    /// reconnects when an established connection drops.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut events = this.context.credentials.subscribe();
        let mut states = this.context.channel.watch_state();

        tokio::spawn(async move {
            let mut last = *states.borrow_and_update();
            loop {
                let resync = tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            debug!(?event, "[BOOTSTRAP] credentials changed");
                            true
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "[BOOTSTRAP] credential events lagged");
                            true
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *states.borrow_and_update();
                        let dropped =
                            last == ChannelState::Connected && current == ChannelState::Failed;
                        last = current;
                        if dropped {
                            info!("[BOOTSTRAP] connection lost; reconnecting");
                        }
                        dropped
                    }
                };

                if !resync {
                    continue;
                }
                // After a successful sync any later transition is still
                // unseen, so a drop right after connecting is not missed.
                last = match this.sync().await {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(code = err.code(), error = %err, "[BOOTSTRAP] channel sync failed");
                        *states.borrow_and_update()
                    }
                };
            }
            debug!("[BOOTSTRAP] watcher stopped");
        })
    }

    async fn sync_logged(&self) {
        if let Err(err) = self.sync().await {
            warn!(code = err.code(), error = %err, "[BOOTSTRAP] channel sync failed");
        }
    }
}

impl From<SessionContext> for SessionBootstrapper {
    fn from(context: SessionContext) -> Self {
        Self::new(context)
    }
}
