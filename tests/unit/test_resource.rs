//! Unit tests for the resource model
//!
//! Tests cover:
//! - Mock endpoint URLs per protocol
//! - Async minion endpoints and topics
//! - Container environment wiring

use microcks_host::resource::{
    ArtifactManifest, ContainerImage, MockServerBuilder, MockServerResource, RemoteArtifact,
    ASYNC_MINION_HTTP_PORT,
};
use std::path::PathBuf;

fn running(name: &str) -> MockServerResource {
    let mut resource = MockServerBuilder::new(name, "/srv/apphost")
        .unwrap()
        .with_async_feature()
        .build();
    resource
        .endpoint_mut()
        .allocate_from_url("http://localhost:55001")
        .unwrap();
    resource
        .async_minion_mut()
        .unwrap()
        .endpoint_mut()
        .allocate("localhost", 55002);
    resource
}

// ============================================================================
// Mock Server Tests
// ============================================================================

mod mock_server_tests {
    use super::*;

    #[test]
    fn test_manifests_in_declaration_order() {
        let resource = MockServerBuilder::new("microcks", "/srv/apphost")
            .unwrap()
            .with_main_artifacts(["./apis/../apis/pastry.yaml"])
            .with_main_remote_artifacts([RemoteArtifact::new("https://example.com/films.graphql")])
            .build();

        assert_eq!(
            resource.manifests(),
            &[
                ArtifactManifest::MainArtifact(PathBuf::from("/srv/apphost/apis/pastry.yaml")),
                ArtifactManifest::MainRemoteArtifact(RemoteArtifact::new(
                    "https://example.com/films.graphql"
                )),
            ]
        );
    }

    #[test]
    fn test_endpoints_of_running_server() {
        let resource = running("microcks");
        assert_eq!(
            resource
                .rest_mock_endpoint("API Pastries", "0.0.1")
                .unwrap()
                .to_string(),
            "http://localhost:55001/rest/API%20Pastries/0.0.1"
        );
        assert_eq!(
            resource.grpc_mock_endpoint().unwrap().to_string(),
            "grpc://localhost:55001"
        );
    }

    #[test]
    fn test_environment_links_minion() {
        let resource = running("microcks");
        let env = resource.environment();
        assert_eq!(env["ASYNC_MINION_URL"], "http://localhost:55002");

        let minion = resource.async_minion().unwrap();
        let minion_env = minion.environment(resource.endpoint());
        assert_eq!(minion_env["MICROCKS_HOST_PORT"], "localhost:55001");
    }

    #[test]
    fn test_custom_image_feeds_minion() {
        let resource = MockServerBuilder::new("microcks", "/srv/apphost")
            .unwrap()
            .with_image(ContainerImage::new(
                "registry.internal",
                "mirror/microcks-uber",
                "1.12.1-native",
            ))
            .with_async_feature()
            .build();

        assert_eq!(
            resource.async_minion().unwrap().image().to_string(),
            "registry.internal/mirror/microcks-uber-async-minion:1.12.1"
        );
    }
}

// ============================================================================
// Async Minion Tests
// ============================================================================

mod async_minion_tests {
    use super::*;

    #[test]
    fn test_minion_defaults() {
        let resource = running("microcks");
        let minion = resource.async_minion().unwrap();
        assert_eq!(minion.name(), "microcks-async-minion");
        assert_eq!(minion.endpoint().target_port, ASYNC_MINION_HTTP_PORT);
    }

    #[test]
    fn test_websocket_without_verb() {
        let resource = running("microcks");
        let url = resource
            .async_minion()
            .unwrap()
            .websocket_mock_endpoint("User signed-up API", "0.1.1", "user/signedup")
            .unwrap();
        assert_eq!(
            url.to_string(),
            "ws://localhost:55002/api/ws/User+signed-up+API/0.1.1/user/signedup"
        );
    }

    #[test]
    fn test_kafka_topic() {
        let resource = running("microcks");
        assert_eq!(
            resource.async_minion().unwrap().kafka_mock_topic(
                "User signed-up API",
                "0.1.1",
                "SUBSCRIBE user/signedup"
            ),
            "UsersignedupAPI-0.1.1-user-signedup"
        );
    }
}
