//! Resource supervision: readiness detection and health gating.
//!
//! The synchroniser only talks to a resource once [`ResourceHealth`] says it
//! is healthy. [`HealthGate`] is the stock implementation; it re-runs the
//! [`HealthCheck`]s registered per resource, typically an
//! [`OutputReadinessCheck`] on the container's console and an
//! [`HttpHealthCheck`] on the REST API.

pub mod health;
pub mod readiness;

pub use health::{
    HealthCheck, HealthCheckResult, HealthGate, HealthStatus, HttpHealthCheck, ResourceHealth,
    Severity,
};
pub use readiness::{
    BufferedLogSource, LogSource, LogStream, OutputReadinessCheck, ReadinessOutcome,
};
