//! Post-provisioning artifact synchronisation.
//!
//! Once the host has created every container, [`ArtifactSynchronizer`] walks
//! the declared mock servers, waits for each to become healthy and pushes its
//! artifacts in a fixed order: main artifacts, secondary artifacts, main
//! remote artifacts, secondary remote artifacts, snapshots. Later imports may
//! reference services declared by earlier ones, so the order is structural
//! and imports never overlap.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::{CancellationContext, CancellationSource};
use crate::client::MicrocksClient;
use crate::config::Config;
use crate::errors::{MicrocksError, Result};
use crate::observability::telemetry::{safe_for_log, track_operation};
use crate::resource::MockServerResource;
use crate::supervision::ResourceHealth;

pub use crate::config::ExecutionMode;

/// Domain clients keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, MicrocksClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One HTTP client per resource whose endpoint is allocated.
    pub fn from_resources(resources: &[MockServerResource], config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for resource in resources {
            if let Some(url) = resource.endpoint().url() {
                registry.register(resource.name(), MicrocksClient::connect(&url, config)?);
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, resource: &str, client: MicrocksClient) {
        self.clients.insert(resource.to_string(), client);
    }

    pub fn get(&self, resource: &str) -> Result<&MicrocksClient> {
        self.clients
            .get(resource)
            .ok_or_else(|| MicrocksError::UnknownResource(resource.to_string()))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Imports performed for one resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSyncReport {
    pub resource: String,
    pub main_artifacts: usize,
    pub secondary_artifacts: usize,
    pub main_remote_artifacts: usize,
    pub secondary_remote_artifacts: usize,
    pub snapshots: usize,
}

impl ResourceSyncReport {
    pub fn total(&self) -> usize {
        self.main_artifacts
            + self.secondary_artifacts
            + self.main_remote_artifacts
            + self.secondary_remote_artifacts
            + self.snapshots
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<ResourceSyncReport>,
    /// Resources without an allocated endpoint
    pub skipped: Vec<String>,
}

impl SyncReport {
    pub fn total_imports(&self) -> usize {
        self.synced.iter().map(ResourceSyncReport::total).sum()
    }
}

/// One-shot artifact synchroniser. Dropping it cancels in-flight work.
pub struct ArtifactSynchronizer {
    shutdown: CancellationSource,
    mode: ExecutionMode,
    health: Arc<dyn ResourceHealth>,
    clients: ClientRegistry,
}

impl ArtifactSynchronizer {
    pub fn new(
        mode: ExecutionMode,
        health: Arc<dyn ResourceHealth>,
        clients: ClientRegistry,
    ) -> Self {
        Self {
            shutdown: CancellationSource::new(),
            mode,
            health,
            clients,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Cancel every in-flight and future synchronisation.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the import workflow for every resource, one resource at a time.
    ///
    /// Stops at the first failure; imports already done are not rolled back.
    pub async fn after_resources_created(
        &self,
        resources: &[MockServerResource],
        ctx: &CancellationContext,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if self.mode == ExecutionMode::Publish {
            debug!("Skipping artifact synchronisation in {} mode", self.mode);
            return Ok(report);
        }

        let ctx = self.shutdown.context().linked(ctx);
        for resource in resources {
            if !resource.endpoint().is_allocated() {
                debug!("Endpoint of {} not allocated, skipping", resource.name());
                report.skipped.push(resource.name().to_string());
                continue;
            }
            if ctx.is_cancelled() {
                return Err(MicrocksError::Cancelled);
            }

            let synced = track_operation("sync_resource", resource.name(), || {
                self.sync_resource(resource, &ctx)
            })
            .await?;
            report.synced.push(synced);
        }
        Ok(report)
    }

    async fn sync_resource(
        &self,
        resource: &MockServerResource,
        ctx: &CancellationContext,
    ) -> Result<ResourceSyncReport> {
        let client = self.clients.get(resource.name())?;
        self.health.wait_until_healthy(resource.name(), ctx).await?;

        let mut report = ResourceSyncReport {
            resource: resource.name().to_string(),
            ..ResourceSyncReport::default()
        };

        for path in resource.main_artifacts() {
            check(ctx)?;
            client.import_artifact(path, true, ctx).await?;
            report.main_artifacts += 1;
        }
        for path in resource.secondary_artifacts() {
            check(ctx)?;
            client.import_artifact(path, false, ctx).await?;
            report.secondary_artifacts += 1;
        }
        for remote in resource.main_remote_artifacts() {
            check(ctx)?;
            client
                .import_remote_artifact(&remote.url, true, remote.secret_name.as_deref(), ctx)
                .await?;
            report.main_remote_artifacts += 1;
        }
        for remote in resource.secondary_remote_artifacts() {
            check(ctx)?;
            client
                .import_remote_artifact(&remote.url, false, remote.secret_name.as_deref(), ctx)
                .await?;
            report.secondary_remote_artifacts += 1;
        }
        for path in resource.snapshots() {
            check(ctx)?;
            client.import_snapshot(path, ctx).await?;
            report.snapshots += 1;
        }

        if report.total() == 0 {
            warn!("No artifacts declared for {}", safe_for_log(resource.name()));
        }
        info!(
            "Artifacts synchronised for {} ({} imports)",
            safe_for_log(resource.name()),
            report.total()
        );
        Ok(report)
    }
}

impl Drop for ArtifactSynchronizer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn check(ctx: &CancellationContext) -> Result<()> {
    if ctx.is_cancelled() {
        Err(MicrocksError::Cancelled)
    } else {
        Ok(())
    }
}
