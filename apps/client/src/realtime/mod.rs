//! Authenticated push-notification channel.

pub mod channel;
pub mod memory;
pub mod notify;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use channel::{ChannelConfig, ChannelState, NotificationChannel};
pub use notify::{LoggingSink, NotificationSink};
pub use reconnect::{open_with_retry, ReconnectPolicy};
pub use transport::{Connection, Transport, WsTransport};
