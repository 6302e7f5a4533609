//! Retry discipline for backend calls.
//!
//! The transport refuses a second call while one is in flight and the
//! backend refuses commands while it is still busy with an earlier one.
//! Both conditions clear on their own, so every call goes through
//! [`RetryPolicy::run`], which sleeps and reissues the call until it
//! produces anything other than a transient error.

use std::future::Future;
use std::time::Duration;

use tether_config::RetryConfig;
use tether_rpc::RpcError;
use tokio::time::Instant;
use tracing::trace;

/// Default pause between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// How transient errors are retried.
///
/// Without a deadline a call is retried for as long as it keeps failing
/// transiently; a hung backend therefore blocks the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryPolicy {
    /// Unbounded retries, `interval` apart.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Give up with [`RpcError::DeadlineExceeded`] once `deadline` has
    /// passed since the first attempt.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Policy from the `[retry]` settings.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.interval()).with_deadline(config.deadline())
    }

    /// Pause between attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on the total time spent retrying, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Run `call` until it succeeds or fails with a non-transient error.
    ///
    /// Policies hold no state, so `call` may itself run nested calls
    /// through the same policy.
    pub async fn run<F, Fut, T>(&self, mut call: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let started = Instant::now();
        let mut attempt = 1u32;
        loop {
            match call().await {
                Err(err) if err.is_transient() => {
                    if let Some(deadline) = self.deadline {
                        if started.elapsed() >= deadline {
                            return Err(RpcError::DeadlineExceeded(deadline));
                        }
                    }
                    trace!(attempt, "transient error, retrying: {err}");
                    attempt += 1;
                    tokio::time::sleep(self.interval).await;
                }
                other => return other,
            }
        }
    }
}
