//! Waiting for a rebooting device to come back.

use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::transport::SessionFactory;

/// Default pause before each reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// How to wait for a device after an update-triggered reboot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause before every attempt, including the first.
    pub delay: Duration,

    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// A session obtained after a reboot.
pub struct Reconnected<S> {
    pub session: S,
    /// Number of connection attempts made, at least one.
    pub attempts: u32,
}

/// Sleep, then try to connect, until the device answers.
///
/// Connectivity failures are retried. Anything else, such as a changed host
/// key or rejected credentials, is returned immediately since waiting will not
/// fix it.
pub async fn reconnect<F: SessionFactory>(
    factory: &F,
    host: &str,
    policy: &RetryPolicy,
) -> Result<Reconnected<F::Session>> {
    let mut attempts = 0u32;

    loop {
        info!("waiting for router {} to come back up...", host);
        tokio::time::sleep(policy.delay).await;
        attempts += 1;

        match factory.connect(host).await {
            Ok(session) => {
                info!("router {} is back after {} attempt(s)", host, attempts);
                return Ok(Reconnected { session, attempts });
            }
            Err(e) if e.is_retryable() => {
                debug!("reconnect attempt {} to {} failed: {}", attempts, host, e);
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
