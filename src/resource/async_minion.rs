//! Async minion companion of a mock server (WebSocket, Kafka and friends).

use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ContainerImage, Endpoint};
use crate::errors::{MicrocksError, Result};
use crate::supervision::readiness::DEFAULT_READINESS_TIMEOUT;
use crate::supervision::{LogSource, OutputReadinessCheck};

pub const ASYNC_MINION_HTTP_PORT: u16 = 8081;
pub const ASYNC_MINION_READY_MARKER: &str = "Profile prod activated.";
pub const DEFAULT_KAFKA_PORT: u16 = 9093;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMinionResource {
    name: String,
    parent: String,
    image: ContainerImage,
    endpoint: Endpoint,
    kafka_bootstrap: Option<String>,
    async_protocols: Vec<String>,
}

impl AsyncMinionResource {
    pub(crate) fn for_parent(parent: &str, parent_image: &ContainerImage) -> Self {
        Self {
            name: format!("{}-async-minion", parent),
            parent: parent.to_string(),
            image: parent_image.async_minion(),
            endpoint: Endpoint::http(ASYNC_MINION_HTTP_PORT),
            kafka_bootstrap: None,
            async_protocols: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn image(&self) -> &ContainerImage {
        &self.image
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// Enable an async protocol (`AMQP`, `MQTT`, ...). Protocols accumulate
    /// in `ASYNC_PROTOCOLS` in the order they were enabled.
    pub fn with_async_protocol(&mut self, protocol: &str) -> &mut Self {
        let protocol = protocol.trim();
        if !protocol.is_empty()
            && !self
                .async_protocols
                .iter()
                .any(|p| p.eq_ignore_ascii_case(protocol))
        {
            self.async_protocols.push(protocol.to_string());
        }
        self
    }

    pub fn async_protocols(&self) -> &[String] {
        &self.async_protocols
    }

    /// Point the minion at a Kafka broker reachable as `host:port` and add
    /// `KAFKA` to the enabled protocols.
    pub fn with_kafka_connection(&mut self, broker: &str, port: Option<u16>) -> &mut Self {
        self.kafka_bootstrap = Some(format!(
            "{}:{}",
            broker,
            port.unwrap_or(DEFAULT_KAFKA_PORT)
        ));
        self.with_async_protocol("KAFKA")
    }

    /// Container environment. `parent_endpoint` is the owning mock server's.
    pub fn environment(&self, parent_endpoint: &Endpoint) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(host_port) = parent_endpoint.host_and_port() {
            env.insert("MICROCKS_HOST_PORT".to_string(), host_port);
        }
        if let Some(bootstrap) = &self.kafka_bootstrap {
            env.insert("KAFKA_BOOTSTRAP_SERVER".to_string(), bootstrap.clone());
        }
        if !self.async_protocols.is_empty() {
            env.insert(
                "ASYNC_PROTOCOLS".to_string(),
                self.async_protocols.join(","),
            );
        }
        env
    }

    pub fn readiness_check(&self, logs: Arc<dyn LogSource>) -> Result<OutputReadinessCheck> {
        Ok(
            OutputReadinessCheck::new(&self.name, ASYNC_MINION_READY_MARKER, logs)?
                .with_timeout(DEFAULT_READINESS_TIMEOUT),
        )
    }

    /// `ws://host:port/api/ws/{service}/{version}/{operation}`.
    ///
    /// Spaces in service and version become `+`; a `SUBSCRIBE `/`PUBLISH `
    /// prefix on the operation is dropped.
    pub fn websocket_mock_endpoint(
        &self,
        service: &str,
        version: &str,
        operation: &str,
    ) -> Result<Url> {
        let (host, port) = self
            .endpoint
            .host()
            .zip(self.endpoint.port())
            .ok_or_else(|| MicrocksError::EndpointNotAllocated(self.name.clone()))?;
        let url = format!(
            "ws://{}:{}/api/ws/{}/{}/{}",
            host,
            port,
            service.replace(' ', "+"),
            version.replace(' ', "+"),
            operation_name(operation)
        );
        Url::parse(&url).map_err(|e| MicrocksError::invalid("operation", e.to_string()))
    }

    /// Topic the minion publishes mock messages to.
    pub fn kafka_mock_topic(&self, service: &str, version: &str, operation: &str) -> String {
        format!(
            "{}-{}-{}",
            service.replace([' ', '-'], ""),
            version,
            operation_name(operation).replace('/', "-")
        )
    }
}

fn operation_name(operation: &str) -> &str {
    if operation.contains(' ') {
        operation.split(' ').nth(1).unwrap_or(operation)
    } else {
        operation
    }
}
