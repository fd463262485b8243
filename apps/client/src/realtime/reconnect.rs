//! Retry decorator around [`NotificationChannel::open`].
//!
//! The channel itself never retries. This wrapper re-reads the credential
//! store's token on every attempt, so a refresh between attempts is honored
//! and a logout stops the loop.

use std::time::Duration;

use rand::random;
use tokio::time::sleep;
use tracing::warn;

use crate::error::ClientError;
use crate::realtime::channel::NotificationChannel;
use crate::state::credential_store::CredentialStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Total attempts, the first one included. 1 disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), capped and jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jitter = (random::<f64>() * 2.0 - 1.0) * jitter_range;
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// Open `channel` with the store's current token, retrying transient
/// failures per `policy`.
pub async fn open_with_retry(
    channel: &NotificationChannel,
    credentials: &CredentialStore,
    policy: &ReconnectPolicy,
) -> Result<(), ClientError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let Some(token) = credentials.token() else {
            return Err(ClientError::Unauthorized);
        };

        match channel.open(&token).await {
            Ok(()) => return Ok(()),
            Err(err) if !err.is_transient() || attempt >= policy.max_attempts.max(1) => {
                return Err(err)
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    code = err.code(),
                    error = %err,
                    attempt,
                    retry_delay_ms = delay.as_millis() as u64,
                    "[CHANNEL] open failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
