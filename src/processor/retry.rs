//! Bounded retry around a fallible producer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::{ProcessError, ProducerError};
use super::error_log::{ErrorLog, FailureKind};
use super::Payload;
use crate::producer::Producer;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 3.0;

/// Attempt bound and fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy, clamping to at least one attempt and a non-negative delay.
    ///
    /// NaN and negative delays become zero; delays too large for a
    /// `Duration` saturate instead of panicking.
    pub fn new(max_retries: u32, retry_delay_secs: f64) -> Self {
        let retry_delay = if retry_delay_secs > 0.0 {
            Duration::try_from_secs_f64(retry_delay_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS)
    }
}

/// Runs a producer with retries, logging every failed attempt.
///
/// # Behaviour
/// - Retryable failures are logged as `Attempt n` and retried until the
///   policy's bound is reached, then surface as `RetryExhausted`.
/// - Fatal failures are logged once and surface immediately as `Fatal`.
/// - The first success short-circuits remaining attempts.
/// - A cancelled token interrupts the pause between attempts.
pub struct RetryingInvoker {
    policy: RetryPolicy,
    log: Arc<ErrorLog>,
    cancel: Option<CancellationToken>,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy, log: Arc<ErrorLog>) -> Self {
        Self {
            policy,
            log,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke(&self, producer: &dyn Producer, item: &Path) -> Result<Payload, ProcessError> {
        let name = item
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| item.display().to_string());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match producer.produce(item).await {
                Ok(payload) => {
                    if attempt > 1 {
                        tracing::info!("'{}' succeeded on attempt {}", name, attempt);
                    }
                    return Ok(payload);
                }
                Err(err) if err.is_retryable() => {
                    self.log
                        .record(&name, FailureKind::Attempt(attempt), &err.to_string())
                        .await;

                    if attempt >= self.policy.max_retries {
                        tracing::warn!(
                            "'{}' failed after {} attempt(s): {}",
                            name,
                            attempt,
                            err
                        );
                        return Err(ProcessError::RetryExhausted {
                            item: name,
                            attempts: attempt,
                            source: err,
                        });
                    }

                    tracing::info!(
                        "Attempt {}/{} for '{}' failed, retrying in {:?}: {}",
                        attempt,
                        self.policy.max_retries,
                        name,
                        self.policy.retry_delay,
                        err
                    );
                    self.pause().await?;
                }
                Err(err) => {
                    let message = match err {
                        ProducerError::Fatal(message) => message,
                        other => other.to_string(),
                    };
                    self.log
                        .record(&name, FailureKind::Unrecoverable, &message)
                        .await;
                    tracing::warn!("Unrecoverable error for '{}': {}", name, message);
                    return Err(ProcessError::Fatal {
                        item: name,
                        message,
                    });
                }
            }
        }
    }

    async fn pause(&self) -> Result<(), ProcessError> {
        let delay = self.policy.retry_delay;
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(ProcessError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}
