//! Declared mock-server resources and the artifacts attached to them.
//!
//! Resources are plain data: the host builds them with [`MockServerBuilder`],
//! allocates their endpoint once the container is running, and hands them to
//! the synchroniser. Nothing here performs I/O.

use reqwest::Url;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::client::MicrocksClient;
use crate::config::{Config, ImageConfig, RemoteArtifactConfig, DEFAULT_READY_MARKER};
use crate::errors::{require_non_empty, MicrocksError, Result};
use crate::supervision::{HealthCheck, HttpHealthCheck, LogSource, OutputReadinessCheck};

pub mod async_minion;

pub use async_minion::{AsyncMinionResource, ASYNC_MINION_HTTP_PORT, ASYNC_MINION_READY_MARKER};

pub const MICROCKS_HTTP_PORT: u16 = 8080;
pub const MICROCKS_READY_TIMEOUT: Duration = Duration::from_secs(5);
pub const PRIMARY_ENDPOINT_NAME: &str = "http";

/// Container image coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub registry: String,
    pub image: String,
    pub tag: String,
}

impl Default for ContainerImage {
    fn default() -> Self {
        Self::from(&ImageConfig::default())
    }
}

impl From<&ImageConfig> for ContainerImage {
    fn from(config: &ImageConfig) -> Self {
        Self {
            registry: config.registry.clone(),
            image: config.image.clone(),
            tag: config.tag.clone(),
        }
    }
}

impl fmt::Display for ContainerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.image, self.tag)
    }
}

impl ContainerImage {
    pub fn new(
        registry: impl Into<String>,
        image: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Image of the async minion matching this Microcks image.
    ///
    /// Native builds have no minion counterpart, so a `-native` tag suffix
    /// falls back to the JVM tag.
    pub fn async_minion(&self) -> Self {
        let tag = self
            .tag
            .strip_suffix("-native")
            .unwrap_or(&self.tag)
            .to_string();
        Self {
            registry: self.registry.clone(),
            image: self
                .image
                .replace("microcks-uber", "microcks-uber-async-minion"),
            tag,
        }
    }
}

/// A container endpoint. Host and port are known only once allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub scheme: String,
    pub target_port: u16,
    allocation: Option<(String, u16)>,
}

impl Endpoint {
    pub fn http(target_port: u16) -> Self {
        Self {
            name: PRIMARY_ENDPOINT_NAME.to_string(),
            scheme: "http".to_string(),
            target_port,
            allocation: None,
        }
    }

    pub fn allocate(&mut self, host: impl Into<String>, port: u16) {
        self.allocation = Some((host.into(), port));
    }

    /// Allocate from an already running server's base URL.
    pub fn allocate_from_url(&mut self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|e| MicrocksError::invalid("url", format!("{url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| MicrocksError::invalid("url", format!("{url} has no host")))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| MicrocksError::invalid("url", format!("{url} has no port")))?;
        self.scheme = parsed.scheme().to_string();
        self.allocate(host, port);
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    pub fn host(&self) -> Option<&str> {
        self.allocation.as_ref().map(|(h, _)| h.as_str())
    }

    pub fn port(&self) -> Option<u16> {
        self.allocation.as_ref().map(|(_, p)| *p)
    }

    /// `host:port`
    pub fn host_and_port(&self) -> Option<String> {
        self.allocation
            .as_ref()
            .map(|(h, p)| format!("{}:{}", h, p))
    }

    pub fn url(&self) -> Option<String> {
        self.allocation
            .as_ref()
            .map(|(h, p)| format!("{}://{}:{}", self.scheme, h, p))
    }
}

/// Artifact Microcks fetches itself, optionally with a stored secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub url: String,
    pub secret_name: Option<String>,
}

impl RemoteArtifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret_name: None,
        }
    }

    pub fn with_secret(url: impl Into<String>, secret_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret_name: Some(secret_name.into()),
        }
    }
}

impl From<&str> for RemoteArtifact {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<&RemoteArtifactConfig> for RemoteArtifact {
    fn from(config: &RemoteArtifactConfig) -> Self {
        Self {
            url: config.url.clone(),
            secret_name: config.secret_name.clone(),
        }
    }
}

impl From<String> for RemoteArtifact {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// One artifact to import once the server is healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactManifest {
    MainArtifact(PathBuf),
    SecondaryArtifact(PathBuf),
    MainRemoteArtifact(RemoteArtifact),
    SecondaryRemoteArtifact(RemoteArtifact),
    Snapshot(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockServerResource {
    name: String,
    endpoint: Endpoint,
    manifests: Vec<ArtifactManifest>,
    image: ContainerImage,
    readiness_marker: String,
    readiness_timeout: Duration,
    async_minion: Option<AsyncMinionResource>,
}

impl MockServerResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    pub fn image(&self) -> &ContainerImage {
        &self.image
    }

    pub fn manifests(&self) -> &[ArtifactManifest] {
        &self.manifests
    }

    pub fn async_minion(&self) -> Option<&AsyncMinionResource> {
        self.async_minion.as_ref()
    }

    pub fn async_minion_mut(&mut self) -> Option<&mut AsyncMinionResource> {
        self.async_minion.as_mut()
    }

    pub fn main_artifacts(&self) -> impl Iterator<Item = &Path> {
        self.manifests.iter().filter_map(|m| match m {
            ArtifactManifest::MainArtifact(p) => Some(p.as_path()),
            _ => None,
        })
    }

    pub fn secondary_artifacts(&self) -> impl Iterator<Item = &Path> {
        self.manifests.iter().filter_map(|m| match m {
            ArtifactManifest::SecondaryArtifact(p) => Some(p.as_path()),
            _ => None,
        })
    }

    pub fn main_remote_artifacts(&self) -> impl Iterator<Item = &RemoteArtifact> {
        self.manifests.iter().filter_map(|m| match m {
            ArtifactManifest::MainRemoteArtifact(r) => Some(r),
            _ => None,
        })
    }

    pub fn secondary_remote_artifacts(&self) -> impl Iterator<Item = &RemoteArtifact> {
        self.manifests.iter().filter_map(|m| match m {
            ArtifactManifest::SecondaryRemoteArtifact(r) => Some(r),
            _ => None,
        })
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Path> {
        self.manifests.iter().filter_map(|m| match m {
            ArtifactManifest::Snapshot(p) => Some(p.as_path()),
            _ => None,
        })
    }

    fn base_url(&self) -> Result<Url> {
        let url = self
            .endpoint
            .url()
            .ok_or_else(|| MicrocksError::EndpointNotAllocated(self.name.clone()))?;
        Url::parse(&url).map_err(|e| MicrocksError::invalid("endpoint", e.to_string()))
    }

    fn mock_endpoint(&self, kind: &str, service: &str, version: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| MicrocksError::EndpointNotAllocated(self.name.clone()))?
            .clear()
            .extend([kind, service, version]);
        Ok(url)
    }

    pub fn rest_mock_endpoint(&self, service: &str, version: &str) -> Result<Url> {
        self.mock_endpoint("rest", service, version)
    }

    pub fn soap_mock_endpoint(&self, service: &str, version: &str) -> Result<Url> {
        self.mock_endpoint("soap", service, version)
    }

    pub fn graphql_mock_endpoint(&self, service: &str, version: &str) -> Result<Url> {
        self.mock_endpoint("graphql", service, version)
    }

    /// The HTTP endpoint with a `grpc` scheme.
    pub fn grpc_mock_endpoint(&self) -> Result<Url> {
        let host_and_port = self
            .endpoint
            .host_and_port()
            .ok_or_else(|| MicrocksError::EndpointNotAllocated(self.name.clone()))?;
        Url::parse(&format!("grpc://{}", host_and_port))
            .map_err(|e| MicrocksError::invalid("endpoint", e.to_string()))
    }

    /// Environment the container expects, given what is allocated so far.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("OTEL_JAVAAGENT_ENABLED".to_string(), "true".to_string());
        if let Some(url) = self.async_minion.as_ref().and_then(|m| m.endpoint().url()) {
            env.insert("ASYNC_MINION_URL".to_string(), url);
        }
        env
    }

    /// Console check waiting for the server's startup banner.
    pub fn readiness_check(&self, logs: Arc<dyn LogSource>) -> Result<OutputReadinessCheck> {
        Ok(
            OutputReadinessCheck::new(&self.name, &self.readiness_marker, logs)?
                .with_timeout(self.readiness_timeout),
        )
    }

    /// HTTP `/api/health` probe of the allocated endpoint.
    pub fn http_health_check(&self, config: &Config) -> Result<HttpHealthCheck> {
        let url = self
            .endpoint
            .url()
            .ok_or_else(|| MicrocksError::EndpointNotAllocated(self.name.clone()))?;
        let client = MicrocksClient::connect(&url, config)?;
        Ok(HttpHealthCheck::new(&self.name, client))
    }

    /// Checks to register for this resource: the HTTP probe, plus the console
    /// check when the host can supply logs.
    pub fn health_checks(
        &self,
        config: &Config,
        logs: Option<Arc<dyn LogSource>>,
    ) -> Result<Vec<Arc<dyn HealthCheck>>> {
        let mut checks: Vec<Arc<dyn HealthCheck>> = vec![Arc::new(self.http_health_check(config)?)];
        if let Some(logs) = logs {
            checks.push(Arc::new(self.readiness_check(logs)?));
        }
        Ok(checks)
    }
}

/// Fluent builder for [`MockServerResource`].
///
/// Relative artifact paths are resolved against the app-host directory.
#[derive(Debug)]
pub struct MockServerBuilder {
    app_host_dir: PathBuf,
    resource: MockServerResource,
}

impl MockServerBuilder {
    pub fn new(name: &str, app_host_dir: impl Into<PathBuf>) -> Result<Self> {
        require_non_empty("name", name)?;
        Ok(Self {
            app_host_dir: app_host_dir.into(),
            resource: MockServerResource {
                name: name.to_string(),
                endpoint: Endpoint::http(MICROCKS_HTTP_PORT),
                manifests: Vec::new(),
                image: ContainerImage::default(),
                readiness_marker: DEFAULT_READY_MARKER.to_string(),
                readiness_timeout: MICROCKS_READY_TIMEOUT,
                async_minion: None,
            },
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            normalize(&self.app_host_dir.join(path))
        }
    }

    pub fn with_main_artifacts<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let resolved = self.resolve(path.as_ref());
            self.resource
                .manifests
                .push(ArtifactManifest::MainArtifact(resolved));
        }
        self
    }

    pub fn with_secondary_artifacts<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let resolved = self.resolve(path.as_ref());
            self.resource
                .manifests
                .push(ArtifactManifest::SecondaryArtifact(resolved));
        }
        self
    }

    pub fn with_main_remote_artifacts<I, R>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RemoteArtifact>,
    {
        self.resource.manifests.extend(
            artifacts
                .into_iter()
                .map(|a| ArtifactManifest::MainRemoteArtifact(a.into())),
        );
        self
    }

    pub fn with_secondary_remote_artifacts<I, R>(mut self, artifacts: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RemoteArtifact>,
    {
        self.resource.manifests.extend(
            artifacts
                .into_iter()
                .map(|a| ArtifactManifest::SecondaryRemoteArtifact(a.into())),
        );
        self
    }

    pub fn with_snapshots(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            return Err(MicrocksError::invalid(
                "snapshotsFilePath",
                "cannot be null or whitespace",
            ));
        }
        let resolved = self.resolve(path);
        self.resource
            .manifests
            .push(ArtifactManifest::Snapshot(resolved));
        Ok(self)
    }

    pub fn with_image(mut self, image: ContainerImage) -> Self {
        self.resource.image = image;
        self
    }

    pub fn with_readiness(mut self, marker: impl Into<String>, timeout: Duration) -> Self {
        self.resource.readiness_marker = marker.into();
        self.resource.readiness_timeout = timeout;
        self
    }

    /// Attach an async minion derived from the current image. Idempotent.
    pub fn with_async_feature(mut self) -> Self {
        if self.resource.async_minion.is_none() {
            self.resource.async_minion = Some(AsyncMinionResource::for_parent(
                &self.resource.name,
                &self.resource.image,
            ));
        }
        self
    }

    pub fn build(self) -> MockServerResource {
        self.resource
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
