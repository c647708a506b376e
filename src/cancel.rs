//! Composable cancellation for suspension points.
//!
//! A [`CancellationSource`] owns a shutdown flag. Any number of
//! [`CancellationContext`] values observe it; contexts can be linked with
//! other contexts and armed with a deadline, so a single await point can exit
//! promptly when the caller, an owning component, or a timer gives up.

use futures::future::{select_all, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// One of the linked sources was cancelled explicitly.
    Signalled,
    /// The armed deadline elapsed.
    DeadlineElapsed,
}

/// Owner side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal every context derived from this source. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn context(&self) -> CancellationContext {
        CancellationContext {
            signals: vec![self.tx.subscribe()],
            deadline: None,
        }
    }
}

/// Observer side: the union of zero or more signals and an optional deadline.
///
/// `CancellationContext::default()` never cancels.
#[derive(Debug, Clone, Default)]
pub struct CancellationContext {
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancellationContext {
    pub fn none() -> Self {
        Self::default()
    }

    /// A context cancelled as soon as either `self` or `other` is.
    pub fn linked(&self, other: &CancellationContext) -> Self {
        let mut signals = self.signals.clone();
        signals.extend(other.signals.iter().cloned());
        let deadline = match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { signals, deadline }
    }

    /// Derive a context that additionally expires `timeout` from now.
    /// A timeout past the clock's range adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(ctx.deadline.map_or(deadline, |d| d.min(deadline)));
        ctx
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this context is cancelled right now, if it is.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(CancelReason::Signalled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(CancelReason::DeadlineElapsed),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once any linked signal fires or the deadline elapses.
    pub async fn cancelled(&self) -> CancelReason {
        let waits: Vec<BoxFuture<'static, ()>> = self
            .signals
            .iter()
            .cloned()
            .map(|mut rx| {
                async move {
                    // A dropped source can no longer cancel anything.
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                .boxed()
            })
            .collect();

        let signalled = async move {
            if waits.is_empty() {
                std::future::pending::<()>().await;
            } else {
                select_all(waits).await;
            }
        };

        tokio::select! {
            biased;
            _ = signalled => CancelReason::Signalled,
            _ = sleep_until_opt(self.deadline) => CancelReason::DeadlineElapsed,
        }
    }

    /// Drive `fut` to completion unless this context is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        if let Some(reason) = self.reason() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            out = fut => Ok(out),
        }
    }

    /// Cancellable sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CancelReason> {
        self.run(tokio::time::sleep(duration)).await
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}
