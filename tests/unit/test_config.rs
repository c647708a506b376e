//! Unit tests for the config module
//!
//! Tests cover:
//! - ExecutionMode enum
//! - Config defaults
//! - TOML loading of resources
//! - Environment overrides and validation

use microcks_host::config::{Config, ExecutionMode};
use microcks_host::errors::MicrocksError;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

// ============================================================================
// ExecutionMode Tests
// ============================================================================

mod execution_mode_tests {
    use super::*;

    #[test]
    fn test_default_is_run() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Run);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ExecutionMode::Run), "run");
        assert_eq!(format!("{}", ExecutionMode::Publish), "publish");
    }
}

// ============================================================================
// Loading Tests
// ============================================================================

mod loading_tests {
    use super::*;

    const FULL: &str = r#"
url = "http://microcks.local:8585"

[http]
request_timeout_secs = 12

[timing]
poll_interval_ms = 250
import_attempts = 3

[readiness]
marker = "Started MicrocksApplication"
timeout_secs = 10

[image]
tag = "nightly"

[[resources]]
name = "pastry"
main_artifacts = ["apis/pastry.yaml"]
secondary_artifacts = ["apis/pastry.postman.json"]
snapshots = ["snapshots/pastry.json"]

[[resources.main_remote_artifacts]]
url = "https://raw.githubusercontent.com/microcks/microcks/master/samples/films.graphql"

[[resources]]
name = "orders"
url = "http://orders-microcks:8080"
"#;

    fn load(content: &str) -> anyhow::Result<Config> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Config::load(Some(file.path().to_str().unwrap()))
    }

    #[test]
    fn test_load_full_file() {
        let config = load(FULL).unwrap();
        assert_eq!(config.url, "http://microcks.local:8585");
        assert_eq!(config.http.request_timeout_secs, 12);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.timing.poll_interval_ms, 250);
        assert_eq!(config.timing.poll_initial_delay_ms, 100);
        assert_eq!(config.timing.import_attempts, 3);
        assert_eq!(config.readiness.timeout_secs, 10);
        assert_eq!(config.image.registry, "quay.io");
        assert_eq!(config.image.tag, "nightly");

        assert_eq!(config.resources.len(), 2);
        let pastry = &config.resources[0];
        assert_eq!(pastry.main_artifacts, vec![PathBuf::from("apis/pastry.yaml")]);
        assert_eq!(pastry.main_remote_artifacts.len(), 1);
        assert!(pastry.main_remote_artifacts[0].secret_name.is_none());
        assert_eq!(config.resource_url(pastry), "http://microcks.local:8585");
        assert_eq!(
            config.resource_url(&config.resources[1]),
            "http://orders-microcks:8080"
        );
    }

    #[test]
    fn test_duplicate_resources_rejected() {
        let err = load(
            r#"
[[resources]]
name = "pastry"

[[resources]]
name = "pastry"
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MicrocksError>(),
            Some(MicrocksError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(load("url = \"not a url\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some("/nonexistent/microcks-host.toml")).is_err());
    }
}

// ============================================================================
// Override Tests
// ============================================================================

mod override_tests {
    use super::*;

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("MICROCKS_HOST_URL", "http://override:9090"),
            ("MICROCKS_HOST_HTTP_TIMEOUT", "not-a-number"),
            ("MICROCKS_HOST_READY_TIMEOUT", "42"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.url, "http://override:9090");
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.readiness.timeout_secs, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_marker_is_invalid() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "MICROCKS_HOST_READY_MARKER").then(|| " ".to_string()));
        assert!(config.validate().is_err());
    }
}
