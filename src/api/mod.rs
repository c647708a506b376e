//! Raw REST transport for the Microcks API.
//!
//! Pure request/response mapping over the server's fixed endpoints. There is
//! no retry, polling or status interpretation here beyond turning failed
//! requests into [`TransportError`]; that is the job of
//! [`crate::client::MicrocksClient`].

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::HttpConfig;
use crate::errors::{MicrocksError, TransportError};

pub mod types;

use types::*;

/// Content type sent with every uploaded artifact part.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/json";

/// An artifact file loaded in memory, ready to be sent as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl ArtifactFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub async fn read(path: &Path) -> Result<Self, MicrocksError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| MicrocksError::ArtifactIo {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file_name: file_name_of(path),
            content,
        })
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Status and optional payload of the invocation metrics endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsResponse {
    pub status: StatusCode,
    pub statistic: Option<DailyInvocationStatistic>,
}

/// Trait abstraction over the Microcks REST surface, enabling test mocking.
#[async_trait]
pub trait MicrocksApi: Send + Sync {
    /// `POST /api/tests`
    async fn submit_test(&self, request: &TestRequest) -> Result<TestResult, TransportError>;

    /// `GET /api/tests/{id}`
    async fn refresh_test_result(&self, test_result_id: &str)
        -> Result<TestResult, TransportError>;

    /// `GET /api/tests/{id}/messages/{caseId}`
    async fn messages_for_test_case(
        &self,
        test_result_id: &str,
        test_case_id: &str,
    ) -> Result<Vec<RequestResponsePair>, TransportError>;

    /// `GET /api/tests/{id}/events/{caseId}`
    async fn events_for_test_case(
        &self,
        test_result_id: &str,
        test_case_id: &str,
    ) -> Result<Vec<UnidirectionalEvent>, TransportError>;

    /// `POST /api/artifact/upload?mainArtifact={bool}`
    async fn upload_artifact(
        &self,
        main_artifact: bool,
        file: &ArtifactFile,
    ) -> Result<StatusCode, TransportError>;

    /// `POST /api/artifact/download`
    async fn download_artifact(
        &self,
        main_artifact: bool,
        url: &str,
        secret_name: Option<&str>,
    ) -> Result<StatusCode, TransportError>;

    /// `POST /api/import`
    async fn import_snapshot(&self, file: &ArtifactFile) -> Result<StatusCode, TransportError>;

    /// `GET /api/metrics/invocations/{service}/{version}?day=yyyyMMdd`
    async fn invocation_statistic(
        &self,
        service_name: &str,
        service_version: &str,
        day: Option<NaiveDate>,
    ) -> Result<MetricsResponse, TransportError>;

    /// `GET /api/health`
    async fn health(&self) -> Result<StatusCode, TransportError>;
}

/// `reqwest`-backed transport bound to one Microcks base URL.
#[derive(Debug, Clone)]
pub struct HttpMicrocksApi {
    client: Client,
    base_url: String,
}

impl HttpMicrocksApi {
    pub fn new(base_url: &str, http: &HttpConfig) -> Result<Self, MicrocksError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| MicrocksError::invalid("base_url", format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(MicrocksError::invalid(
                "base_url",
                format!("{base_url} cannot be used as a base URL"),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .build()
            .map_err(|e| MicrocksError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join an already-escaped path onto the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| TransportError::InvalidRequest(format!("{raw}: {e}")))
    }

    /// Append raw segments, percent-encoding each one.
    fn endpoint_segments(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.endpoint("/")?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidRequest(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn artifact_form(file: &ArtifactFile) -> Result<Form, TransportError> {
        let part = Part::bytes(file.content.clone())
            .file_name(file.file_name.clone())
            .mime_str(ARTIFACT_CONTENT_TYPE)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Form::new().part("file", part))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            message: body,
        });
    }
    serde_json::from_str(&body).map_err(|e| TransportError::Parse(e.to_string()))
}

#[async_trait]
impl MicrocksApi for HttpMicrocksApi {
    async fn submit_test(&self, request: &TestRequest) -> Result<TestResult, TransportError> {
        let url = self.endpoint("/api/tests")?;
        debug!("Submitting test for {} to {}", request.service_id, url);
        let response = self.client.post(url).json(request).send().await?;
        read_json(response).await
    }

    async fn refresh_test_result(
        &self,
        test_result_id: &str,
    ) -> Result<TestResult, TransportError> {
        let url = self.endpoint_segments(&["api", "tests", test_result_id])?;
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    async fn messages_for_test_case(
        &self,
        test_result_id: &str,
        test_case_id: &str,
    ) -> Result<Vec<RequestResponsePair>, TransportError> {
        // The case id is already url-encoded and goes on the wire verbatim.
        let url = self.endpoint(&format!(
            "/api/tests/{test_result_id}/messages/{test_case_id}"
        ))?;
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    async fn events_for_test_case(
        &self,
        test_result_id: &str,
        test_case_id: &str,
    ) -> Result<Vec<UnidirectionalEvent>, TransportError> {
        let url = self.endpoint(&format!("/api/tests/{test_result_id}/events/{test_case_id}"))?;
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    async fn upload_artifact(
        &self,
        main_artifact: bool,
        file: &ArtifactFile,
    ) -> Result<StatusCode, TransportError> {
        let url = self.endpoint("/api/artifact/upload")?;
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .query(&[("mainArtifact", main_artifact)])
            .multipart(Self::artifact_form(file)?)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn download_artifact(
        &self,
        main_artifact: bool,
        url: &str,
        secret_name: Option<&str>,
    ) -> Result<StatusCode, TransportError> {
        let endpoint = self.endpoint("/api/artifact/download")?;
        let main = main_artifact.to_string();
        let mut query: Vec<(&str, &str)> = vec![("mainArtifact", main.as_str()), ("url", url)];
        if let Some(secret) = secret_name {
            query.push(("secretName", secret));
        }
        let response = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn import_snapshot(&self, file: &ArtifactFile) -> Result<StatusCode, TransportError> {
        let url = self.endpoint("/api/import")?;
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .multipart(Self::artifact_form(file)?)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn invocation_statistic(
        &self,
        service_name: &str,
        service_version: &str,
        day: Option<NaiveDate>,
    ) -> Result<MetricsResponse, TransportError> {
        let url = self.endpoint_segments(&[
            "api",
            "metrics",
            "invocations",
            service_name,
            service_version,
        ])?;
        let mut request = self.client.get(url);
        if let Some(day) = day {
            request = request.query(&[("day", day.format("%Y%m%d").to_string())]);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // An empty body and a JSON `null` both mean no invocation that day.
        let statistic = if status == StatusCode::OK && !body.trim().is_empty() {
            serde_json::from_str::<Option<DailyInvocationStatistic>>(&body)
                .map_err(|e| TransportError::Parse(e.to_string()))?
        } else {
            None
        };
        Ok(MetricsResponse { status, statistic })
    }

    async fn health(&self) -> Result<StatusCode, TransportError> {
        let url = self.endpoint("/api/health")?;
        let response = self.client.get(url).send().await?;
        Ok(response.status())
    }
}
