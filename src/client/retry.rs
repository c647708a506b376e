//! Fixed-delay retry for artifact uploads and snapshot imports.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancellationContext;
use crate::errors::{MicrocksError, Result, TransportError};

/// Retry configuration for upload-style calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Fixed pause between two attempts, no backoff
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. The last transient failure is returned to the caller.
///
/// `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &CancellationContext,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, TransportError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!("{} (attempt {}/{})", what, attempt, max_attempts);

        let outcome = ctx
            .run(op(attempt))
            .await
            .map_err(|_| MicrocksError::Cancelled)?;

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    "{} failed on attempt {}/{}: {}",
                    what, attempt, max_attempts, e
                );
                if attempt >= max_attempts {
                    return Err(e.into());
                }
            }
            Err(e) => return Err(e.into()),
        }

        ctx.sleep(policy.delay)
            .await
            .map_err(|_| MicrocksError::Cancelled)?;
        attempt += 1;
    }
}
