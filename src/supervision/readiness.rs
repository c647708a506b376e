//! Console-output readiness detection.
//!
//! A resource is ready once its log stream contains a marker line. The stream
//! comes from a [`LogSource`], which hosts implement over whatever logging
//! subsystem they have; [`BufferedLogSource`] is an in-process one that
//! replays the backlog to late subscribers.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error};

use super::health::{HealthCheck, HealthStatus, Severity};
use crate::cancel::{CancelReason, CancellationContext};
use crate::errors::{require_non_empty, Result};

/// Default time a readiness check may watch a stream.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Batches of log lines, in emission order.
pub type LogStream = BoxStream<'static, anyhow::Result<Vec<String>>>;

/// Live output of the resources managed by the host.
pub trait LogSource: Send + Sync {
    /// Subscribe to `resource`'s output. Dropping the stream unsubscribes.
    fn watch(&self, resource: &str) -> LogStream;
}

/// How a readiness watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Matched,
    StreamEnded,
    TimedOut,
    Failed(String),
    /// The caller stopped waiting; says nothing about the resource.
    Cancelled,
}

/// Watches a resource's output for a case-insensitive marker substring.
pub struct OutputReadinessCheck {
    name: String,
    resource: String,
    marker: String,
    timeout: Duration,
    source: Arc<dyn LogSource>,
}

impl OutputReadinessCheck {
    pub fn new(
        resource: impl Into<String>,
        marker: impl Into<String>,
        source: Arc<dyn LogSource>,
    ) -> Result<Self> {
        let resource = resource.into();
        let marker = marker.into();
        require_non_empty("resource", &resource)?;
        require_non_empty("outputSubstring", &marker)?;

        Ok(Self {
            name: format!("wait-for-output-health-check-{}", resource),
            resource,
            marker: marker.to_lowercase(),
            timeout: DEFAULT_READINESS_TIMEOUT,
            source,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn matches(&self, line: &str) -> bool {
        line.to_lowercase().contains(&self.marker)
    }

    /// Read the stream until the marker shows up or the watch has to stop.
    ///
    /// Reading stops at the batch containing the marker; the subscription is
    /// dropped on every exit path.
    pub async fn watch(&self, ctx: &CancellationContext) -> ReadinessOutcome {
        debug!("Checking console output for {}", self.resource);
        let scoped = ctx.with_timeout(self.timeout);
        let mut stream = self.source.watch(&self.resource);

        loop {
            let next = match scoped.run(stream.next()).await {
                Ok(next) => next,
                Err(_) if ctx.is_cancelled() => return ReadinessOutcome::Cancelled,
                Err(CancelReason::DeadlineElapsed) => return ReadinessOutcome::TimedOut,
                Err(CancelReason::Signalled) => return ReadinessOutcome::Cancelled,
            };

            match next {
                None => return ReadinessOutcome::StreamEnded,
                Some(Err(e)) => {
                    error!(
                        "Error while checking console output for {}: {}",
                        self.resource, e
                    );
                    return ReadinessOutcome::Failed(e.to_string());
                }
                Some(Ok(batch)) => {
                    if batch.iter().any(|line| self.matches(line)) {
                        debug!(
                            "Console output contains expected log line for {}",
                            self.resource
                        );
                        return ReadinessOutcome::Matched;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl HealthCheck for OutputReadinessCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &CancellationContext) -> HealthStatus {
        match self.watch(ctx).await {
            ReadinessOutcome::Matched => HealthStatus::Healthy,
            ReadinessOutcome::Cancelled => HealthStatus::Inconclusive {
                reason: format!("Stopped watching console output of {}", self.resource),
            },
            ReadinessOutcome::StreamEnded => HealthStatus::Unhealthy {
                reason: format!(
                    "Console output of {} ended before the expected log line",
                    self.resource
                ),
                severity: Severity::Critical,
            },
            ReadinessOutcome::TimedOut => HealthStatus::Unhealthy {
                reason: format!(
                    "Expected log line not seen in console output of {} within {:?}",
                    self.resource, self.timeout
                ),
                severity: Severity::Critical,
            },
            ReadinessOutcome::Failed(e) => HealthStatus::Unhealthy {
                reason: format!("Error while checking console output: {}", e),
                severity: Severity::Critical,
            },
        }
    }
}

const LIVE_CAPACITY: usize = 256;
/// Batches replayed to late subscribers; older batches are dropped.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 1024;

struct ResourceLog {
    backlog: VecDeque<Vec<String>>,
    live: Option<broadcast::Sender<Vec<String>>>,
}

impl Default for ResourceLog {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(LIVE_CAPACITY);
        Self {
            backlog: VecDeque::new(),
            live: Some(tx),
        }
    }
}

/// In-process [`LogSource`]: every subscriber first receives the most recent
/// backlog, then live batches until the resource's log is closed.
pub struct BufferedLogSource {
    logs: Mutex<HashMap<String, ResourceLog>>,
    backlog_capacity: usize,
}

impl Default for BufferedLogSource {
    fn default() -> Self {
        Self::with_backlog_capacity(DEFAULT_BACKLOG_CAPACITY)
    }
}

impl BufferedLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backlog_capacity(backlog_capacity: usize) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            backlog_capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResourceLog>> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a batch of lines to `resource`'s output.
    pub fn publish<I, S>(&self, resource: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let batch: Vec<String> = lines.into_iter().map(Into::into).collect();
        let mut logs = self.lock();
        let log = logs.entry(resource.to_string()).or_default();
        if self.backlog_capacity > 0 {
            while log.backlog.len() >= self.backlog_capacity {
                log.backlog.pop_front();
            }
            log.backlog.push_back(batch.clone());
        }
        if let Some(tx) = &log.live {
            // No receiver is fine; the backlog keeps the batch.
            let _ = tx.send(batch);
        }
    }

    /// Number of batches currently held for replay.
    pub fn backlog_len(&self, resource: &str) -> usize {
        self.lock().get(resource).map_or(0, |log| log.backlog.len())
    }

    /// End `resource`'s output; open subscriptions finish after draining.
    pub fn close(&self, resource: &str) {
        let mut logs = self.lock();
        logs.entry(resource.to_string()).or_default().live = None;
    }
}

impl LogSource for BufferedLogSource {
    fn watch(&self, resource: &str) -> LogStream {
        let mut logs = self.lock();
        let log = logs.entry(resource.to_string()).or_default();
        let backlog = stream::iter(log.backlog.clone().into_iter().map(Ok));

        let Some(tx) = &log.live else {
            return backlog.boxed();
        };

        let live = stream::unfold(tx.subscribe(), |mut rx| async move {
            match rx.recv().await {
                Ok(batch) => Some((Ok(batch), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Some((
                    Err(anyhow::anyhow!("log subscriber lagged by {} batches", skipped)),
                    rx,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        backlog.chain(live).boxed()
    }
}
