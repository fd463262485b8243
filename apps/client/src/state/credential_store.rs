//! Owner of the session token and the signed-in user.
//!
//! The store is the single source of truth for the token: everything that
//! needs it (the notification channel, bearer headers, the navigation guard)
//! reads it from here at the moment of use.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::token;
use crate::error::ClientError;
use crate::storage::{KeyValueStore, TOKEN_KEY, USER_KEY};

const EVENT_CAPACITY: usize = 16;

/// User identifier as returned by the server (numeric or opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Str(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{id}"),
            UserId::Str(id) => f.write_str(id),
        }
    }
}

/// Signed-in user as returned by login/registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Any further profile fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(id: UserId, username: Option<String>) -> Self {
        Self {
            id,
            username,
            extra: Map::new(),
        }
    }
}

/// Point-in-time copy of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credential {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl Credential {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// `sub` claim of the current token, decoded on every call.
    pub fn subject_id(&self) -> Option<String> {
        token::subject_id(self.token.as_deref())
    }
}

/// Change notification fanned out to dependents such as the bootstrapper.
///
/// Events carry no payload; receivers read the store's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEvent {
    Set,
    Cleared,
}

pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
    current: RwLock<Credential>,
    // Set after the first storage failure; the session is memory-only from then on.
    degraded: AtomicBool,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            current: RwLock::new(Credential::default()),
            degraded: AtomicBool::new(false),
            events,
        }
    }

    /// Restore the session persisted by a previous run.
    ///
    /// A token that does not decode is logged and kept: only the server can
    /// declare it invalid.
    pub async fn initialize(&self) -> Credential {
        let restored = self.read_persisted().await;
        *self.current.write() = restored.clone();

        info!(
            has_token = restored.token.is_some(),
            has_user = restored.user.is_some(),
            "[CREDENTIALS] initialized"
        );
        restored
    }

    /// Re-read persisted state, e.g. after another process rewrote it.
    ///
    /// Emits an event when the token changed.
    pub async fn reload(&self) -> Credential {
        if self.is_degraded() {
            return self.snapshot();
        }

        let restored = self.read_persisted().await;
        let changed = {
            let mut current = self.current.write();
            let changed = current.token != restored.token;
            *current = restored.clone();
            changed
        };

        if changed {
            let event = if restored.token.is_some() {
                CredentialEvent::Set
            } else {
                CredentialEvent::Cleared
            };
            debug!(?event, "[CREDENTIALS] reload picked up a new token");
            self.emit(event);
        }
        restored
    }

    /// Install a token, and the user when one is supplied.
    ///
    /// Passing `None` for `user` keeps the previously known user, so a bare
    /// token refresh does not sign the user out of their profile.
    pub async fn set_auth(
        &self,
        token: impl Into<String>,
        user: Option<User>,
    ) -> Result<(), ClientError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ClientError::validation("token must not be empty"));
        }

        {
            let mut current = self.current.write();
            current.token = Some(token.clone());
            if let Some(user) = &user {
                current.user = Some(user.clone());
            }
        }

        self.persist(TOKEN_KEY, &token).await;
        if let Some(user) = &user {
            match serde_json::to_string(user) {
                Ok(encoded) => self.persist(USER_KEY, &encoded).await,
                Err(err) => warn!(error = %err, "[CREDENTIALS] failed to encode user"),
            }
        }

        if let Err(err) = token::decode(Some(&token)) {
            warn!(code = err.code(), error = %err, "[CREDENTIALS] new token does not decode");
        }
        debug!(user_updated = user.is_some(), "[CREDENTIALS] auth set");
        self.emit(CredentialEvent::Set);
        Ok(())
    }

    /// Forget the session. Clearing an empty store changes nothing.
    pub async fn clear_auth(&self) {
        let was_present = {
            let mut current = self.current.write();
            let was_present = current.token.is_some() || current.user.is_some();
            *current = Credential::default();
            was_present
        };

        self.erase(TOKEN_KEY).await;
        self.erase(USER_KEY).await;

        if was_present {
            debug!("[CREDENTIALS] auth cleared");
            self.emit(CredentialEvent::Cleared);
        }
    }

    pub fn snapshot(&self) -> Credential {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.current.read().user.clone()
    }

    pub fn subject_id(&self) -> Option<String> {
        self.current.read().subject_id()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    async fn read_persisted(&self) -> Credential {
        let token = match self.storage.get(TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(err) => {
                self.degrade(&err);
                return Credential::default();
            }
        };

        let user = match self.storage.get(USER_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Option<User>>(&raw) {
                Ok(user) => user,
                Err(err) => {
                    warn!(error = %err, "[CREDENTIALS] ignoring unreadable persisted user");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                self.degrade(&err);
                None
            }
        };

        if let Err(err) = token::decode(token.as_deref()) {
            warn!(
                code = err.code(),
                error = %err,
                "[CREDENTIALS] persisted token does not decode; keeping it"
            );
        }

        Credential { token, user }
    }

    async fn persist(&self, key: &str, value: &str) {
        if self.is_degraded() {
            return;
        }
        if let Err(err) = self.storage.set(key, value).await {
            self.degrade(&err);
        }
    }

    async fn erase(&self, key: &str) {
        if self.is_degraded() {
            return;
        }
        if let Err(err) = self.storage.remove(key).await {
            self.degrade(&err);
        }
    }

    fn degrade(&self, err: &ClientError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                code = err.code(),
                error = %err,
                "[CREDENTIALS] storage unavailable; session is memory-only for this process"
            );
        }
    }

    fn emit(&self, event: CredentialEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.read();
        f.debug_struct("CredentialStore")
            .field("has_token", &current.token.is_some())
            .field("user", &current.user)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}
