//! Test-result polling.
//!
//! A submitted test is re-fetched until the server reports it is no longer in
//! progress. The loop runs under a context linking the caller's cancellation
//! with the polling deadline, so it can tell "caller gave up" (an error) from
//! "deadline reached" (a normal outcome the caller recovers from).

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::api::types::TestResult;
use crate::cancel::{CancelReason, CancellationContext};
use crate::errors::{MicrocksError, Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Pause between submission and the first poll
    pub initial_delay: Duration,
    /// Pause between two polls
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The last fetched result is no longer in progress.
    Completed(TestResult),
    /// The deadline elapsed first.
    DeadlineReached,
}

/// Poll with `refresh` until completion, the deadline, or caller cancellation.
/// Without a deadline only completion or the caller can stop the loop.
///
/// Transport errors from `refresh` end polling and are returned as-is.
pub async fn poll_until_complete<F, Fut>(
    schedule: &PollSchedule,
    caller: &CancellationContext,
    deadline: Option<Instant>,
    mut refresh: F,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<TestResult, TransportError>>,
{
    let polling = match deadline {
        Some(deadline) => caller.with_deadline(deadline),
        None => caller.clone(),
    };

    if let Err(reason) = polling.sleep(schedule.initial_delay).await {
        return stopped(caller, reason);
    }

    let mut polls = 0u32;
    loop {
        let result = match polling.run(refresh()).await {
            Ok(fetched) => fetched?,
            Err(reason) => return stopped(caller, reason),
        };
        polls += 1;

        if !result.in_progress {
            debug!("Test {} completed after {} poll(s)", result.id, polls);
            return Ok(PollOutcome::Completed(result));
        }
        debug!("Test {} still in progress (poll {})", result.id, polls);

        if let Err(reason) = polling.sleep(schedule.interval).await {
            return stopped(caller, reason);
        }
    }
}

fn stopped(caller: &CancellationContext, reason: CancelReason) -> Result<PollOutcome> {
    // The caller's own signals and deadline win over the polling deadline.
    if caller.is_cancelled() {
        return Err(MicrocksError::Cancelled);
    }
    match reason {
        CancelReason::DeadlineElapsed => Ok(PollOutcome::DeadlineReached),
        CancelReason::Signalled => Err(MicrocksError::Cancelled),
    }
}
