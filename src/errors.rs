use std::path::PathBuf;
use thiserror::Error;

/// The central error type for Microcks host integration.
///
/// Library-internal recoverable conditions (health probe failures, missing
/// metrics, poll timeouts) never reach this type; they are absorbed into
/// sentinel values. Everything here is a hard failure for the caller.
#[derive(Error, Debug)]
pub enum MicrocksError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to upload artifact '{name}' (status {status})")]
    UploadRejected { name: String, status: u16 },

    #[error("Failed to import snapshot '{name}' (status {status})")]
    ImportRejected { name: String, status: u16 },

    /// `url` holds the remote location with credentials redacted.
    #[error("Failed to import remote artifact from '{url}' (status {status})")]
    RemoteImportRejected { url: String, status: u16 },

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Failed to read artifact {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No Microcks client registered for resource '{0}'")]
    UnknownResource(String),

    #[error("Endpoint of resource '{0}' is not allocated")]
    EndpointNotAllocated(String),

    #[error("Resource '{resource}' did not become healthy: {reason}")]
    Unhealthy { resource: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures raised by the raw REST transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Connection-level failures that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Parse(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::HttpStatus {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

impl MicrocksError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        MicrocksError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MicrocksError>;

/// Reject empty or whitespace-only required arguments before any I/O.
pub(crate) fn require_non_empty(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MicrocksError::invalid(name, "must not be empty"));
    }
    Ok(())
}

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_TEST_FAILED: u8 = 3;
pub const EXIT_API_ERROR: u8 = 4;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<MicrocksError>() {
        return match err {
            MicrocksError::Config(_) | MicrocksError::InvalidArgument { .. } => EXIT_CONFIG_ERROR,
            MicrocksError::Transport(_)
            | MicrocksError::UploadRejected { .. }
            | MicrocksError::ImportRejected { .. }
            | MicrocksError::RemoteImportRejected { .. }
            | MicrocksError::Unhealthy { .. } => EXIT_API_ERROR,
            _ => EXIT_ERROR,
        };
    }

    if e.downcast_ref::<TransportError>().is_some() {
        return EXIT_API_ERROR;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("config") {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_ERROR
    }
}
