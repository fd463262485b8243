use std::sync::Arc;

use crate::auth::api::AuthApi;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::guard::routes::RouteTable;
use crate::guard::session_guard::SessionGuard;
use crate::realtime::{NotificationChannel, Transport, WsTransport};
use crate::state::credential_store::CredentialStore;
use crate::storage::{FileStore, KeyValueStore};

/// Everything a session needs, constructed once and passed around explicitly.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub config: ClientConfig,
    pub credentials: Arc<CredentialStore>,
    pub channel: NotificationChannel,
    pub guard: Arc<SessionGuard>,
    pub api: AuthApi,
}

/// Builder for [`SessionContext`] (used in both tests and main).
///
/// Defaults: configuration from [`ClientConfig::default`], a [`FileStore`] at
/// the configured path, and the WebSocket transport.
#[derive(Default)]
pub struct ContextBuilder {
    config: Option<ClientConfig>,
    storage: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    routes: Option<RouteTable>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn build(self) -> Result<SessionContext, ClientError> {
        let config = self.config.unwrap_or_default();
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileStore::new(config.storage_path.clone())));
        let transport = self.transport.unwrap_or_else(|| Arc::new(WsTransport));
        let routes = self.routes.unwrap_or_default();

        let api = AuthApi::new(config.api_url.clone(), config.request_timeout)?;
        let channel = NotificationChannel::new(transport, config.channel_config());

        Ok(SessionContext {
            credentials: Arc::new(CredentialStore::new(storage)),
            channel,
            guard: Arc::new(SessionGuard::new(routes)),
            api,
            config,
        })
    }
}

pub fn build_context() -> ContextBuilder {
    ContextBuilder::new()
}
