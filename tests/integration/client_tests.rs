//! Wire-level behaviour of `MicrocksClient` over `HttpMicrocksApi`.

use chrono::NaiveDate;
use microcks_host::api::types::{TestRequest, TestRunnerType};
use microcks_host::cancel::CancellationContext;
use microcks_host::errors::{MicrocksError, TransportError};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{artifact_dir, client_for};

#[tokio::test]
async fn test_upload_main_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/artifact/upload"))
        .and(query_param("mainArtifact", "true"))
        .and(header("accept", "application/json"))
        .and(body_string_contains("filename=\"pastry.yaml\""))
        .and(body_string_contains("Content-Type: application/json"))
        .respond_with(ResponseTemplate::new(201).set_body_string("API Pastries:0.0.1"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = artifact_dir(&["pastry.yaml"]);
    client_for(&server.uri())
        .import_artifact(&dir.path().join("pastry.yaml"), true, &CancellationContext::none())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_upload_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/artifact/upload"))
        .and(query_param("mainArtifact", "false"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let dir = artifact_dir(&["broken.json"]);
    let err = client_for(&server.uri())
        .import_artifact(&dir.path().join("broken.json"), false, &CancellationContext::none())
        .await
        .unwrap_err();

    match err {
        MicrocksError::UploadRejected { name, status } => {
            assert_eq!(name, "broken.json");
            assert_eq!(status, 400);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_server_retries_then_fails() {
    // Nothing listens on port 1.
    let dir = artifact_dir(&["pastry.yaml"]);
    let start = Instant::now();
    let err = client_for("http://127.0.0.1:1")
        .import_artifact(&dir.path().join("pastry.yaml"), true, &CancellationContext::none())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MicrocksError::Transport(TransportError::Network(_))
    ));
    // Four pauses of 100ms between five attempts.
    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_remote_artifact_download() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/artifact/download"))
        .and(query_param("mainArtifact", "true"))
        .and(query_param("url", "https://example.com/apis/pastry.yaml"))
        .and(query_param("secretName", "github"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server.uri())
        .import_remote_artifact(
            "https://example.com/apis/pastry.yaml",
            true,
            Some("github"),
            &CancellationContext::none(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remote_artifact_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/artifact/download"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server.uri())
        .import_remote_artifact(
            "https://example.com/missing.yaml",
            false,
            None,
            &CancellationContext::none(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MicrocksError::RemoteImportRejected { status: 500, .. }
    ));
}

#[tokio::test]
async fn test_snapshot_import() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/import"))
        .and(body_string_contains("filename=\"repository.json\""))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dir = artifact_dir(&["repository.json"]);
    client_for(&server.uri())
        .import_snapshot(&dir.path().join("repository.json"), &CancellationContext::none())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_endpoint_polls_until_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tests"))
        .and(body_string_contains("\"runnerType\":\"OPEN_API_SCHEMA\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "t-42",
            "testNumber": 3,
            "inProgress": true,
            "runnerType": "OPEN_API_SCHEMA"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tests/t-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t-42",
            "testNumber": 3,
            "inProgress": true
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tests/t-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t-42",
            "testNumber": 3,
            "inProgress": false,
            "success": false,
            "runnerType": "OPEN_API_SCHEMA",
            "testCaseResults": [
                {
                    "success": false,
                    "operationName": "GET /pastries",
                    "testStepResults": [
                        {"success": false, "message": "string found, number expected"}
                    ]
                },
                {"success": true, "operationName": "GET /pastries/{name}"}
            ]
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let request = TestRequest::builder(
        "API Pastries:0.0.1",
        TestRunnerType::OpenApiSchema,
        "http://bad-impl:3001",
    )
    .timeout(Duration::from_secs(2))
    .build();

    let result = client_for(&server.uri())
        .test_endpoint(&request, &CancellationContext::none())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(!result.in_progress);
    assert_eq!(result.test_case_results.len(), 2);
    let failure = result.test_case_results[0].first_failure().unwrap();
    assert!(failure
        .message
        .as_deref()
        .unwrap()
        .contains("string found, number expected"));

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn test_endpoint_returns_last_state_at_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "slow",
            "inProgress": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tests/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "slow",
            "inProgress": true
        })))
        .mount(&server)
        .await;

    let request = TestRequest::builder("Slow:1.0", TestRunnerType::Http, "http://impl")
        .timeout(Duration::from_millis(200))
        .build();

    let start = Instant::now();
    let result = client_for(&server.uri())
        .test_endpoint(&request, &CancellationContext::none())
        .await
        .unwrap();

    assert!(result.in_progress);
    // Deadline is 200ms + 1000ms margin; allow for the final fetch.
    assert!(start.elapsed() >= Duration::from_millis(1200));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_messages_use_encoded_case_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tests/t-42/messages/t-42-3-GET+%21pastries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "request": {"name": "pastries", "content": null},
                "response": {"status": "200", "content": "[]"}
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let result = microcks_host::api::types::TestResult {
        id: "t-42".into(),
        test_number: 3,
        ..Default::default()
    };
    let pairs = client_for(&server.uri())
        .messages_for_test_case(&result, "GET /pastries", &CancellationContext::none())
        .await
        .unwrap();

    assert_eq!(pairs.len(), 1);
    assert_eq!(
        pairs[0].response.as_ref().unwrap().status.as_deref(),
        Some("200")
    );
}

#[tokio::test]
async fn test_event_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/tests/t-7/events/t-7-1-SUBSCRIBE+pastry%21orders",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "eventMessage": {
                    "content": "{\"id\":\"123\",\"status\":\"invalid\"}",
                    "mediaType": "application/json"
                }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let result = microcks_host::api::types::TestResult {
        id: "t-7".into(),
        test_number: 1,
        ..Default::default()
    };
    let events = client_for(&server.uri())
        .event_messages_for_test_case(
            &result,
            "SUBSCRIBE pastry/orders",
            &CancellationContext::none(),
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].event_message.as_ref().unwrap().content.as_deref(),
        Some("{\"id\":\"123\",\"status\":\"invalid\"}")
    );
}

#[tokio::test]
async fn test_invocation_count_and_verify() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/invocations/API%20Pastries/0.0.1"))
        .and(query_param("day", "20240131"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "serviceName": "API Pastries",
            "serviceVersion": "0.0.1",
            "dailyCount": 3
        })))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let day = NaiveDate::from_ymd_opt(2024, 1, 31);
    let ctx = CancellationContext::none();

    let count = client
        .invocations_count("API Pastries", "0.0.1", day, &ctx)
        .await
        .unwrap();
    assert_eq!(count, 3.0);
    assert!(client.verify("API Pastries", "0.0.1", day, &ctx).await.unwrap());
}

#[tokio::test]
async fn test_missing_metrics_read_as_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/invocations/Unused/1.0"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/invocations/Missing/1.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let ctx = CancellationContext::none();
    assert_eq!(
        client
            .invocations_count("Unused", "1.0", None, &ctx)
            .await
            .unwrap(),
        0.0
    );
    assert!(!client.verify("Missing", "1.0", None, &ctx).await.unwrap());
}

#[tokio::test]
async fn test_null_metrics_body_reads_as_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/invocations/Quiet/1.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("null"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let ctx = CancellationContext::none();
    assert_eq!(
        client
            .invocations_count("Quiet", "1.0", None, &ctx)
            .await
            .unwrap(),
        0.0
    );
    assert!(!client.verify("Quiet", "1.0", None, &ctx).await.unwrap());
}

#[tokio::test]
async fn test_health_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let ctx = CancellationContext::none();
    assert!(client_for(&server.uri()).is_healthy(&ctx).await);
    assert!(!client_for("http://127.0.0.1:1").is_healthy(&ctx).await);
}

#[tokio::test]
async fn test_unhealthy_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(
        !client_for(&server.uri())
            .is_healthy(&CancellationContext::none())
            .await
    );
}
