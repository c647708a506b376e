//! Health check system gating work on resources.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationContext;
use crate::client::MicrocksClient;
use crate::errors::{MicrocksError, Result};

/// Health check trait for resources
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Get the name of this health check
    fn name(&self) -> &str;

    /// Perform the health check
    async fn check(&self, ctx: &CancellationContext) -> HealthStatus;
}

/// Health status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Resource is healthy
    Healthy,
    /// The check stopped before reaching a verdict
    Inconclusive { reason: String },
    /// Resource is unhealthy
    Unhealthy { reason: String, severity: Severity },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Severity levels for unhealthy status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Warning - likely to recover
    Warning,
    /// Critical - keep waiting, but something is off
    Critical,
    /// Fatal - waiting is pointless
    Fatal,
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub checked_at: Instant,
    pub response_time: Duration,
}

/// "Wait until this resource is healthy" primitive provided by the host.
#[async_trait]
pub trait ResourceHealth: Send + Sync {
    async fn wait_until_healthy(&self, resource: &str, ctx: &CancellationContext) -> Result<()>;
}

/// Probes the Microcks `/api/health` endpoint.
pub struct HttpHealthCheck {
    name: String,
    client: MicrocksClient,
}

impl HttpHealthCheck {
    pub fn new(resource: &str, client: MicrocksClient) -> Self {
        Self {
            name: format!("{}-http-health-check", resource),
            client,
        }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &CancellationContext) -> HealthStatus {
        if self.client.is_healthy(ctx).await {
            return HealthStatus::Healthy;
        }
        if ctx.is_cancelled() {
            return HealthStatus::Inconclusive {
                reason: "Health probe cancelled".to_string(),
            };
        }
        HealthStatus::Unhealthy {
            reason: "Microcks health endpoint did not answer successfully".to_string(),
            severity: Severity::Warning,
        }
    }
}

/// Runs the checks registered for a resource until they all pass.
///
/// An inconclusive check keeps the status it last reported; a check that
/// never reported anything counts as not healthy yet.
pub struct HealthGate {
    checks: HashMap<String, Vec<Arc<dyn HealthCheck>>>,
    interval: Duration,
    results: Arc<RwLock<HashMap<String, Vec<HealthCheckResult>>>>,
}

impl HealthGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            checks: HashMap::new(),
            interval,
            results: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a health check for `resource`
    pub fn add_check(&mut self, resource: &str, check: Arc<dyn HealthCheck>) {
        self.checks
            .entry(resource.to_string())
            .or_default()
            .push(check);
    }

    pub fn with_check(mut self, resource: &str, check: Arc<dyn HealthCheck>) -> Self {
        self.add_check(resource, check);
        self
    }

    pub fn check_names(&self, resource: &str) -> Vec<&str> {
        self.checks
            .get(resource)
            .map(|checks| checks.iter().map(|c| c.name()).collect())
            .unwrap_or_default()
    }

    /// Last results recorded for `resource`
    pub async fn results(&self, resource: &str) -> Vec<HealthCheckResult> {
        self.results
            .read()
            .await
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    async fn run_round(
        &self,
        resource: &str,
        checks: &[Arc<dyn HealthCheck>],
        ctx: &CancellationContext,
    ) -> Vec<HealthCheckResult> {
        let previous = self.results(resource).await;
        let mut round = Vec::with_capacity(checks.len());

        for check in checks {
            let start = Instant::now();
            let mut status = check.check(ctx).await;
            let response_time = start.elapsed();

            if let HealthStatus::Inconclusive { reason } = &status {
                debug!(check = %check.name(), reason = %reason, "Health check inconclusive");
                status = previous
                    .iter()
                    .find(|r| r.name == check.name())
                    .map(|r| r.status.clone())
                    .unwrap_or_else(|| status.clone());
            }

            round.push(HealthCheckResult {
                name: check.name().to_string(),
                status,
                checked_at: Instant::now(),
                response_time,
            });
        }

        self.results
            .write()
            .await
            .insert(resource.to_string(), round.clone());
        round
    }
}

#[async_trait]
impl ResourceHealth for HealthGate {
    async fn wait_until_healthy(&self, resource: &str, ctx: &CancellationContext) -> Result<()> {
        let Some(checks) = self.checks.get(resource) else {
            debug!("No health checks registered for {}", resource);
            return Ok(());
        };

        let mut round_number = 0u32;
        loop {
            if ctx.is_cancelled() {
                return Err(MicrocksError::Cancelled);
            }
            round_number += 1;
            let round = self.run_round(resource, checks, ctx).await;

            if round.iter().all(|r| r.status.is_healthy()) {
                info!("Resource {} is healthy after {} round(s)", resource, round_number);
                return Ok(());
            }

            for result in &round {
                match &result.status {
                    HealthStatus::Healthy | HealthStatus::Inconclusive { .. } => {}
                    HealthStatus::Unhealthy {
                        reason,
                        severity: Severity::Fatal,
                    } => {
                        error!(check = %result.name, reason = %reason, "Health check failed");
                        return Err(MicrocksError::Unhealthy {
                            resource: resource.to_string(),
                            reason: reason.clone(),
                        });
                    }
                    HealthStatus::Unhealthy { reason, severity } => {
                        warn!(check = %result.name, reason = %reason, severity = ?severity, "Health check failed");
                    }
                }
            }

            ctx.sleep(self.interval)
                .await
                .map_err(|_| MicrocksError::Cancelled)?;
        }
    }
}
