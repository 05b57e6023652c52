//! # Retry Policy
//!
//! One bounded exponential backoff applied to every broker operation:
//! connect, send, reply, listener registration and reconnect.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable as _};
use serde::{Deserialize, Serialize};

use super::errors::{ConnectionError, ConnectionResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        factor: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            factor,
        }
    }

    /// Backoff schedule between attempts
    pub fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    /// Run `attempt` until it succeeds, fails with a non-transient error,
    /// or the attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        metrics: &MetricsRegistry,
        attempt: F,
    ) -> ConnectionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConnectionResult<T>>,
    {
        let mut retries = 0usize;
        let outcome = attempt
            .retry(self.builder())
            .when(ConnectionError::is_transient)
            .notify(|error: &ConnectionError, delay: Duration| {
                retries += 1;
                metrics.increment_send_retries();
                let attempt = retries.to_string();
                let delay_ms = delay.as_millis().to_string();
                let reason = error.to_string();
                log_event_with_fields(
                    Event::TransportRetry,
                    &[
                        ("attempt", attempt.as_str()),
                        ("delay_ms", delay_ms.as_str()),
                        ("error", reason.as_str()),
                        ("operation", operation),
                    ],
                );
            })
            .await;

        outcome.map_err(|error| match error {
            ConnectionError::Transport(last) => {
                metrics.increment_transport_failures();
                let attempts = (retries + 1).to_string();
                let reason = last.to_string();
                log_event_with_fields(
                    Event::TransportExhausted,
                    &[
                        ("attempts", attempts.as_str()),
                        ("error", reason.as_str()),
                        ("operation", operation),
                    ],
                );
                ConnectionError::Exhausted {
                    operation: operation.to_string(),
                    attempts: retries + 1,
                    last,
                }
            }
            other => other,
        })
    }
}
