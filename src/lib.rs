//! Microcks host integration
//!
//! Glue between an application host and Microcks mock servers:
//!
//! - **Client**: contract tests with polling, artifact imports with retry,
//!   health and invocation metrics ([`client::MicrocksClient`])
//! - **Readiness**: console-output and HTTP health checks gating a resource
//!   ([`supervision`])
//! - **Resources**: mock servers, async minions and their artifacts
//!   ([`resource`])
//! - **Sync**: the ordered import workflow run once containers are created
//!   ([`sync::ArtifactSynchronizer`])
//!
//! # Quick Start
//!
//! ```ignore
//! use microcks_host::{CancellationContext, MicrocksClient};
//!
//! let client = MicrocksClient::for_url("http://localhost:8080")?;
//! let ctx = CancellationContext::none();
//! client.import_artifact("apis/pastry.yaml".as_ref(), true, &ctx).await?;
//! let invoked = client.verify("API Pastries", "0.0.1", None, &ctx).await?;
//! ```

pub mod api;
pub mod cancel;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod resource;
pub mod supervision;
pub mod sync;

pub use cancel::{CancelReason, CancellationContext, CancellationSource};
pub use client::MicrocksClient;
pub use config::{Config, ExecutionMode};
pub use errors::{MicrocksError, Result, TransportError};
