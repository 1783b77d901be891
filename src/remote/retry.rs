//! Retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use super::RemoteError;
use crate::config::Settings;

/// Attempts, starting delay and which failures are worth retrying.
///
/// The delay doubles after every failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable: fn(&RemoteError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            retryable: RemoteError::is_retryable,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.remote_max_attempts, settings.remote_base_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Running out of attempts yields `RemoteError::RetriesExhausted`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.retryable)(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::warn!("[Retry] {} failed after {} attempts: {}", label, attempt, err);
                return Err(RemoteError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            tracing::warn!(
                "[Retry] {} attempt {}/{} failed ({}), retrying in {:?}",
                label,
                attempt,
                max_attempts,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }
}
