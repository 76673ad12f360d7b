use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{DeployError, RetryPolicy};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);

/// Shared flag a caller flips to abort a run in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Point in time after which blocking transport calls must give up.
///
/// Checked between steps and from inside every libgit2 progress callback,
/// where returning `false` aborts the transfer.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: CancelToken,
}

impl Deadline {
    /// `timeout` of `None` means the run is only bounded by cancellation.
    pub fn new(timeout: Option<Duration>, cancel: CancelToken) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// `true` while the step may keep going.
    pub fn proceed(&self) -> bool {
        !self.cancel.is_cancelled() && self.remaining() != Some(Duration::ZERO)
    }

    pub fn check(&self, step: &'static str) -> Result<(), DeployError> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled { step });
        }
        if self.remaining() == Some(Duration::ZERO) {
            return Err(DeployError::DeadlineExceeded { step });
        }
        Ok(())
    }
}

/// Run `op` until it succeeds, fails permanently, or `extra_attempts`
/// retries have been spent.
///
/// Backoff doubles from 500ms up to 8s and is clamped to the time left on
/// the deadline. A deadline or cancellation error always wins over the
/// operation's own error.
pub fn with_retries<T>(
    step: &'static str,
    extra_attempts: u32,
    deadline: &Deadline,
    mut op: impl FnMut(u32) -> Result<T, DeployError>,
) -> Result<T, DeployError> {
    with_backoff(step, extra_attempts, BACKOFF_BASE, deadline, &mut op)
}

fn with_backoff<T>(
    step: &'static str,
    extra_attempts: u32,
    base: Duration,
    deadline: &Deadline,
    op: &mut impl FnMut(u32) -> Result<T, DeployError>,
) -> Result<T, DeployError> {
    let mut attempt = 0;
    loop {
        deadline.check(step)?;
        let err = match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        deadline.check(step)?;
        if attempt >= extra_attempts || err.retry_policy() == RetryPolicy::NonRetryable {
            return Err(err);
        }

        let mut delay = base
            .saturating_mul(1u32 << attempt.min(16))
            .min(BACKOFF_CAP);
        if let Some(left) = deadline.remaining() {
            delay = delay.min(left);
        }
        attempt += 1;
        warn!(step, attempt, ?delay, error = %err, "transient failure, retrying");
        thread::sleep(delay);
    }
}
