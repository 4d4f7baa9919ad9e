//! Retry loops used by every assertion and wait in the harness.
//!
//! All waiting goes through a [`Clock`] so the loops can be driven by a fake
//! clock in tests instead of real sleeps.

use crate::jsonrpc::ConnectionFailed;
use std::{
    fmt::Debug,
    future::Future,
    time::{Duration, Instant},
};

#[async_trait::async_trait]
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// How often to retry and, optionally, for how long.
///
/// A loop without a timeout runs until the predicate holds; the scenario
/// deadline is what bounds it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl PollConfig {
    pub fn every(interval: Duration) -> Self {
        PollConfig {
            interval,
            timeout: None,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        PollConfig {
            timeout: Some(timeout),
            ..self
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
#[error("timed out after {after:?} waiting for {what}")]
pub struct Timeout {
    pub what: String,
    pub after: Duration,
}

/// Calls `attempt` until it yields a value, sleeping `config.interval` in
/// between.
///
/// Connection failures are treated like "not yet" and retried on the next
/// iteration, every other error aborts the loop.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    config: PollConfig,
    what: &str,
    mut attempt: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let started = clock.now();

    loop {
        match attempt().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if is_transient(&e) => {
                tracing::debug!("retrying {} after transport failure: {:#}", what, e);
            }
            Err(e) => return Err(e),
        }

        if let Some(timeout) = config.timeout {
            let elapsed = clock.now().saturating_duration_since(started);
            if elapsed >= timeout {
                return Err(Timeout {
                    what: what.to_owned(),
                    after: elapsed,
                }
                .into());
            }
        }

        clock.sleep(config.interval).await;
    }
}

fn is_transient(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<ConnectionFailed>().is_some())
}

#[cfg(test)]
pub use self::fake::FakeClock;
