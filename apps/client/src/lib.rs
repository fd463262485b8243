#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod guard;
pub mod realtime;
pub mod state;
pub mod storage;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use auth::api::{AuthApi, AuthResponse, RegisterRequest};
pub use auth::claims::Claims;
pub use bootstrap::SessionBootstrapper;
pub use config::ClientConfig;
pub use error::ClientError;
pub use guard::{Decision, Redirect, SessionGuard};
pub use realtime::{
    ChannelConfig, ChannelState, LoggingSink, NotificationChannel, NotificationSink,
    ReconnectPolicy,
};
pub use state::credential_store::{Credential, CredentialEvent, CredentialStore, User, UserId};
pub use state::session_context::{build_context, SessionContext};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
