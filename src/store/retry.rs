//! Retry policy shared by the store clients.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::ConnectionConfig;
use crate::error::Result;

/// Fixed-count, constant-delay retry for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// the retry budget is spent.
    ///
    /// `op` receives the zero-based attempt number, which callers use to
    /// rotate between endpoints.
    ///
    /// # Arguments
    /// * `what` - Operation name for log messages
    /// * `op` - The fallible operation
    ///
    /// # Returns
    /// * `Result<T>` - First success, or the last error
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what, e, attempt, self.max_retries, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(5))
    }
}

impl From<&ConnectionConfig> for RetryPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.retry_delay))
    }
}
