//! Domain client for a Microcks server.
//!
//! Layers business behaviour over [`MicrocksApi`]: test submission with
//! polling, retried artifact uploads, remote imports, health and invocation
//! verification. The client holds no mutable state, so one instance can serve
//! concurrent calls.

use chrono::NaiveDate;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::types::{RequestResponsePair, TestRequest, TestResult, UnidirectionalEvent};
use crate::api::{file_name_of, ArtifactFile, HttpMicrocksApi, MicrocksApi};
use crate::cancel::CancellationContext;
use crate::config::{Config, HttpConfig, TimingConfig};
use crate::errors::{require_non_empty, MicrocksError, Result};
use crate::observability::telemetry::safe_for_log;

pub mod polling;
pub mod retry;

use polling::{poll_until_complete, PollOutcome, PollSchedule};
use retry::{with_retry, RetryPolicy};

/// Timing knobs of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTiming {
    pub poll: PollSchedule,
    /// Added to a test's own timeout to form the polling deadline
    pub poll_margin: Duration,
    pub retry: RetryPolicy,
    /// Metrics are updated asynchronously server-side
    pub metrics_delay: Duration,
}

impl Default for ClientTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for ClientTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            poll: PollSchedule {
                initial_delay: Duration::from_millis(timing.poll_initial_delay_ms),
                interval: Duration::from_millis(timing.poll_interval_ms),
            },
            poll_margin: Duration::from_millis(timing.poll_margin_ms),
            retry: RetryPolicy {
                max_attempts: timing.import_attempts,
                delay: Duration::from_millis(timing.import_retry_delay_ms),
            },
            metrics_delay: Duration::from_millis(timing.metrics_delay_ms),
        }
    }
}

/// Id under which Microcks stores the exchanges of one operation of a test run.
///
/// `/` is replaced with `!` before form-url-encoding, so spaces become `+`.
pub fn test_case_id(test_result_id: &str, test_number: u32, operation_name: &str) -> String {
    let operation = operation_name.replace('/', "!");
    let encoded: String = url::form_urlencoded::byte_serialize(operation.as_bytes()).collect();
    format!("{}-{}-{}", test_result_id, test_number, encoded)
}

#[derive(Clone)]
pub struct MicrocksClient {
    api: Arc<dyn MicrocksApi>,
    timing: ClientTiming,
}

impl std::fmt::Debug for MicrocksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrocksClient")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl MicrocksClient {
    pub fn new(api: Arc<dyn MicrocksApi>) -> Self {
        Self {
            api,
            timing: ClientTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ClientTiming) -> Self {
        self.timing = timing;
        self
    }

    /// HTTP client for the server at `base_url`, timed from `config`.
    pub fn connect(base_url: &str, config: &Config) -> Result<Self> {
        let api = HttpMicrocksApi::new(base_url, &config.http)?;
        Ok(Self::new(Arc::new(api)).with_timing(ClientTiming::from(&config.timing)))
    }

    /// HTTP client with default settings.
    pub fn for_url(base_url: &str) -> Result<Self> {
        let api = HttpMicrocksApi::new(base_url, &HttpConfig::default())?;
        Ok(Self::new(Arc::new(api)))
    }

    pub fn timing(&self) -> &ClientTiming {
        &self.timing
    }

    /// Launch a contract test and wait for its completion.
    ///
    /// Polling stops at `request.timeout` plus the configured margin after
    /// submission. Reaching that deadline is not an error: a warning is logged
    /// and the current state of the test is fetched one last time.
    pub async fn test_endpoint(
        &self,
        request: &TestRequest,
        ctx: &CancellationContext,
    ) -> Result<TestResult> {
        require_non_empty("serviceId", &request.service_id)?;
        require_non_empty("testEndpoint", &request.test_endpoint)?;

        let submitted = ctx
            .run(self.api.submit_test(request))
            .await
            .map_err(|_| MicrocksError::Cancelled)??;
        // A timeout too large to represent means polling runs until completion.
        let deadline = Instant::now()
            .checked_add(request.timeout)
            .and_then(|d| d.checked_add(self.timing.poll_margin));

        info!(
            "Test request for service '{}' submitted",
            safe_for_log(&request.service_id)
        );
        debug!("Test result id {}, polling for progression", submitted.id);

        let api = &self.api;
        let id = submitted.id.as_str();
        let outcome = poll_until_complete(&self.timing.poll, ctx, deadline, || {
            api.refresh_test_result(id)
        })
        .await?;

        match outcome {
            PollOutcome::Completed(result) => Ok(result),
            PollOutcome::DeadlineReached => {
                warn!(
                    "Test timeout reached, stopping polling for test {}",
                    safe_for_log(&request.test_endpoint)
                );
                let last = ctx
                    .run(self.api.refresh_test_result(id))
                    .await
                    .map_err(|_| MicrocksError::Cancelled)??;
                Ok(last)
            }
        }
    }

    pub async fn messages_for_test_case(
        &self,
        test_result: &TestResult,
        operation_name: &str,
        ctx: &CancellationContext,
    ) -> Result<Vec<RequestResponsePair>> {
        let case_id = Self::case_id_for(test_result, operation_name)?;
        let messages = ctx
            .run(self.api.messages_for_test_case(&test_result.id, &case_id))
            .await
            .map_err(|_| MicrocksError::Cancelled)??;
        Ok(messages)
    }

    pub async fn event_messages_for_test_case(
        &self,
        test_result: &TestResult,
        operation_name: &str,
        ctx: &CancellationContext,
    ) -> Result<Vec<UnidirectionalEvent>> {
        let case_id = Self::case_id_for(test_result, operation_name)?;
        let events = ctx
            .run(self.api.events_for_test_case(&test_result.id, &case_id))
            .await
            .map_err(|_| MicrocksError::Cancelled)??;
        Ok(events)
    }

    fn case_id_for(test_result: &TestResult, operation_name: &str) -> Result<String> {
        require_non_empty("testResult.id", &test_result.id)?;
        require_non_empty("operationName", operation_name)?;
        Ok(test_case_id(
            &test_result.id,
            test_result.test_number,
            operation_name,
        ))
    }

    /// Upload a local artifact, retrying transient transport failures.
    ///
    /// A non-201 answer means Microcks rejected the file and is never retried.
    pub async fn import_artifact(
        &self,
        path: &Path,
        main_artifact: bool,
        ctx: &CancellationContext,
    ) -> Result<()> {
        let file = Self::load(path).await?;
        let name = safe_for_log(&file.file_name);

        let status = with_retry(
            &self.timing.retry,
            ctx,
            &format!("Uploading artifact '{}'", name),
            |_| self.api.upload_artifact(main_artifact, &file),
        )
        .await?;

        if status != StatusCode::CREATED {
            error!(
                "Failed to upload artifact '{}' with status code {}",
                name, status
            );
            return Err(MicrocksError::UploadRejected {
                name: file.file_name,
                status: status.as_u16(),
            });
        }

        info!("Artifact '{}' uploaded successfully", name);
        Ok(())
    }

    /// Import a repository snapshot, with the same retry policy as uploads.
    pub async fn import_snapshot(&self, path: &Path, ctx: &CancellationContext) -> Result<()> {
        let file = Self::load(path).await?;
        let name = safe_for_log(&file.file_name);

        let status = with_retry(
            &self.timing.retry,
            ctx,
            &format!("Importing snapshot '{}'", name),
            |_| self.api.import_snapshot(&file),
        )
        .await?;

        if status != StatusCode::CREATED {
            error!(
                "Failed to import snapshot '{}' with status code {}",
                name, status
            );
            return Err(MicrocksError::ImportRejected {
                name: file.file_name,
                status: status.as_u16(),
            });
        }

        info!("Snapshot '{}' imported successfully", name);
        Ok(())
    }

    async fn load(path: &Path) -> Result<ArtifactFile> {
        if path.as_os_str().is_empty() {
            return Err(MicrocksError::invalid("artifactPath", "must not be empty"));
        }
        debug!("Reading artifact {}", file_name_of(path));
        ArtifactFile::read(path).await
    }

    /// Ask Microcks to fetch an artifact itself. Single attempt.
    pub async fn import_remote_artifact(
        &self,
        remote_url: &str,
        main_artifact: bool,
        secret_name: Option<&str>,
        ctx: &CancellationContext,
    ) -> Result<()> {
        require_non_empty("remoteUrl", remote_url)?;
        let safe_url = safe_for_log(remote_url);

        let status = ctx
            .run(
                self.api
                    .download_artifact(main_artifact, remote_url, secret_name),
            )
            .await
            .map_err(|_| MicrocksError::Cancelled)??;

        if status != StatusCode::CREATED {
            error!(
                "Failed to import remote artifact from '{}' with status code {}",
                safe_url, status
            );
            return Err(MicrocksError::RemoteImportRejected {
                url: safe_url,
                status: status.as_u16(),
            });
        }

        info!("Remote artifact imported successfully from '{}'", safe_url);
        Ok(())
    }

    /// Probe `/api/health`. Every failure, cancellation included, reads as unhealthy.
    pub async fn is_healthy(&self, ctx: &CancellationContext) -> bool {
        match ctx.run(self.api.health()).await {
            Ok(Ok(status)) if status.is_success() => {
                debug!("Microcks service is healthy");
                true
            }
            Ok(Ok(status)) => {
                debug!("Microcks health probe answered {}", status);
                false
            }
            Ok(Err(e)) => {
                warn!("Exception during health check for Microcks service: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    /// Whether the service version received at least one invocation on `day`
    /// (today, server-side, when `None`).
    pub async fn verify(
        &self,
        service_name: &str,
        service_version: &str,
        day: Option<NaiveDate>,
        ctx: &CancellationContext,
    ) -> Result<bool> {
        let count = self
            .invocations_count(service_name, service_version, day, ctx)
            .await?;
        Ok(count > 0.0)
    }

    /// Daily invocation count, or `0` when Microcks has no statistic for it.
    pub async fn invocations_count(
        &self,
        service_name: &str,
        service_version: &str,
        day: Option<NaiveDate>,
        ctx: &CancellationContext,
    ) -> Result<f64> {
        require_non_empty("serviceName", service_name)?;
        require_non_empty("serviceVersion", service_version)?;

        ctx.sleep(self.timing.metrics_delay)
            .await
            .map_err(|_| MicrocksError::Cancelled)?;

        let response = ctx
            .run(
                self.api
                    .invocation_statistic(service_name, service_version, day),
            )
            .await
            .map_err(|_| MicrocksError::Cancelled)??;

        let name = safe_for_log(service_name);
        let version = safe_for_log(service_version);
        if response.status != StatusCode::OK {
            warn!(
                "Failed to get service invocations for '{}' with version '{}'. Status code: {}",
                name, version, response.status
            );
            return Ok(0.0);
        }

        match response.statistic {
            Some(statistic) => Ok(statistic.daily_count),
            None => {
                warn!(
                    "No content received when getting service invocations for '{}' with version '{}'",
                    name, version
                );
                Ok(0.0)
            }
        }
    }
}
