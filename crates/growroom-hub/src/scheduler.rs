//! Fixed-interval background jobs
//!
//! Each job runs on its own task and its own `tokio::time::interval`, so a
//! slow market tick never delays a heartbeat sweep and neither waits on
//! client traffic. Store work inside a job goes through [`blocking`] so a
//! long transaction holds a blocking-pool thread, not a runtime worker.

use crate::config::RetryPolicy;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, warn};

/// Run `job` every `period`, starting one period from now
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tracing::trace!(job = name, "scheduled run");
            job().await;
        }
    })
}

/// Run synchronous work on the blocking pool
///
/// A panicked or cancelled task surfaces as a transient failure.
pub async fn blocking<T, F>(name: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(growroom_core::Error::TransientInfrastructure(format!(
            "{} task failed: {}",
            name, err
        ))
        .into()),
    }
}

/// Run a fallible step, retrying transient failures with linear backoff
///
/// Non-transient errors and the last transient error are logged and
/// returned.
pub async fn run_with_retry<T, F, Fut>(name: &str, policy: RetryPolicy, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match step().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_before(attempt);
                warn!(job = name, attempt, error = %err, ?delay, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(job = name, attempt, error = %err, "job failed");
                return Err(err);
            }
        }
    }
}
