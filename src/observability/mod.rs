//! Observability module
//!
//! Structured logging setup and log hygiene helpers.

pub mod telemetry;
