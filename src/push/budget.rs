//! Bounded polling for remote work that finishes asynchronously.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_ATTEMPTS: u32 = 30;

/// A poll-count allowance. One unit is consumed per status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    ceiling: u32,
    used: u32,
}

impl AttemptBudget {
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling, used: 0 }
    }

    /// Take one attempt. Returns false once the ceiling is reached.
    pub fn consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.ceiling
    }
}

impl Default for AttemptBudget {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS)
    }
}

/// What a single status check observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Pending,
    Ready(T),
    Failed(T),
}

/// Terminal result of a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// The remote reported failure.
    Failed(T),
    /// We stopped checking; the remote never reached a terminal state.
    TimedOut { attempts: u32 },
}


/// Run `check` every `interval` until it reports a terminal state or the
/// budget runs out. Each check consumes one attempt; check errors end the loop.
pub async fn poll_until<T, E, F, Fut>(
    budget: &mut AttemptBudget,
    interval: Duration,
    mut check: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollState<T>, E>>,
{
    while budget.consume() {
        if budget.used() > 1 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        match check().await? {
            PollState::Ready(value) => return Ok(PollOutcome::Ready(value)),
            PollState::Failed(value) => return Ok(PollOutcome::Failed(value)),
            PollState::Pending => debug!(attempt = budget.used(), "still pending"),
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: budget.used(),
    })
}
