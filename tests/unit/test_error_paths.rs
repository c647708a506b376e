//! Error path and edge case tests
//!
//! These tests focus on failures raised before any I/O:
//! - Invalid arguments to client operations
//! - Missing artifact files
//! - Exit code mapping

use microcks_host::api::types::{TestRequest, TestResult, TestRunnerType};
use microcks_host::cancel::{CancellationContext, CancellationSource};
use microcks_host::client::MicrocksClient;
use microcks_host::errors::{
    get_exit_code, MicrocksError, TransportError, EXIT_API_ERROR, EXIT_CONFIG_ERROR, EXIT_ERROR,
};
use std::path::Path;

// Nothing listens there; reaching the network would fail differently.
fn offline_client() -> MicrocksClient {
    MicrocksClient::for_url("http://127.0.0.1:1").unwrap()
}

// ============================================================================
// Invalid Argument Tests
// ============================================================================

mod invalid_argument_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_service_id() {
        let request = TestRequest::builder(" ", TestRunnerType::Http, "http://impl").build();
        let err = offline_client()
            .test_endpoint(&request, &CancellationContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_empty_operation_name() {
        let result = TestResult {
            id: "t-1".into(),
            ..Default::default()
        };
        let err = offline_client()
            .event_messages_for_test_case(&result, "", &CancellationContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_empty_remote_url() {
        let err = offline_client()
            .import_remote_artifact("", true, None, &CancellationContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_empty_service_name_for_metrics() {
        let err = offline_client()
            .invocations_count("", "1.0", None, &CancellationContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_missing_artifact_file() {
        let err = offline_client()
            .import_artifact(
                Path::new("/nonexistent/pastry.yaml"),
                true,
                &CancellationContext::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::ArtifactIo { .. }));
    }

    #[test]
    fn test_garbage_base_url() {
        assert!(matches!(
            MicrocksClient::for_url("mailto:someone@example.com"),
            Err(MicrocksError::InvalidArgument { .. })
        ));
    }
}

// ============================================================================
// Cancellation Tests
// ============================================================================

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_health_probe_is_unhealthy() {
        let source = CancellationSource::new();
        source.cancel();
        assert!(!offline_client().is_healthy(&source.context()).await);
    }

    #[tokio::test]
    async fn test_cancelled_remote_import() {
        let source = CancellationSource::new();
        source.cancel();
        let err = offline_client()
            .import_remote_artifact("https://example.com/a.yaml", true, None, &source.context())
            .await
            .unwrap_err();
        assert!(matches!(err, MicrocksError::Cancelled));
    }
}

// ============================================================================
// Exit Code Tests
// ============================================================================

mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config: anyhow::Error = MicrocksError::Config("bad".into()).into();
        assert_eq!(get_exit_code(&config), EXIT_CONFIG_ERROR);

        let rejected: anyhow::Error = MicrocksError::UploadRejected {
            name: "a.yaml".into(),
            status: 400,
        }
        .into();
        assert_eq!(get_exit_code(&rejected), EXIT_API_ERROR);

        let transport: anyhow::Error = TransportError::Timeout.into();
        assert_eq!(get_exit_code(&transport), EXIT_API_ERROR);

        let cancelled: anyhow::Error = MicrocksError::Cancelled.into();
        assert_eq!(get_exit_code(&cancelled), EXIT_ERROR);
    }
}
