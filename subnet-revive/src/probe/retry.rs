use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use shared::types::ProbeOutcome;

use crate::config::RetryConfig;
use super::Probe;

/// How many times a dead probe is repeated before the URL counts as dead,
/// and how long to wait in between. The wait doubles after every attempt up
/// to `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Waits between consecutive attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.max_backoff;
        std::iter::successors(Some(self.initial_backoff.min(max)), move |d| {
            Some((*d * 2).min(max))
        })
        .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// A probe that repeats a dead answer according to a [`RetryPolicy`].
pub struct Retrying {
    inner: Arc<dyn Probe>,
    policy: RetryPolicy,
}

impl Retrying {
    pub fn new(inner: Arc<dyn Probe>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl Probe for Retrying {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome> {
        Box::pin(async move {
            let mut outcome = self.inner.probe(url).await;
            for (attempt, delay) in self.policy.delays().enumerate() {
                if outcome.alive {
                    break;
                }
                tracing::trace!(%url, attempt = attempt + 2, ?delay, "retrying probe");
                tokio::time::sleep(delay).await;
                outcome = self.inner.probe(url).await;
            }
            outcome
        })
    }
}
