//! Console-output readiness through the in-process log source.

use microcks_host::cancel::CancellationContext;
use microcks_host::config::Config;
use microcks_host::resource::MockServerBuilder;
use microcks_host::supervision::{
    BufferedLogSource, HealthCheck, HealthGate, HealthStatus, LogSource, ReadinessOutcome,
    ResourceHealth,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_marker_published_after_subscription() {
    let logs = Arc::new(BufferedLogSource::new());
    let resource = MockServerBuilder::new("microcks", "/app").unwrap().build();
    let check = resource
        .readiness_check(logs.clone() as Arc<dyn LogSource>)
        .unwrap();

    let publisher = {
        let logs = logs.clone();
        tokio::spawn(async move {
            logs.publish("microcks", ["Starting MicrocksApplication using Java 21"]);
            tokio::time::sleep(Duration::from_millis(50)).await;
            logs.publish(
                "microcks",
                ["INFO 1 --- [main] Started MicrocksApplication in 3.2 seconds"],
            );
        })
    };

    let outcome = check.watch(&CancellationContext::none()).await;
    publisher.await.unwrap();
    assert_eq!(outcome, ReadinessOutcome::Matched);
}

#[tokio::test]
async fn test_backlog_is_replayed_to_late_checks() {
    let logs = Arc::new(BufferedLogSource::new());
    logs.publish("microcks", ["started microcksapplication"]);

    let resource = MockServerBuilder::new("microcks", "/app").unwrap().build();
    let check = resource.readiness_check(logs).unwrap();
    assert_eq!(
        check.check(&CancellationContext::none()).await,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn test_closed_output_without_marker_is_unhealthy() {
    let logs = Arc::new(BufferedLogSource::new());
    logs.publish("microcks", ["Application failed to start"]);
    logs.close("microcks");

    let resource = MockServerBuilder::new("microcks", "/app").unwrap().build();
    let check = resource.readiness_check(logs).unwrap();
    assert_eq!(
        check.watch(&CancellationContext::none()).await,
        ReadinessOutcome::StreamEnded
    );
    assert!(matches!(
        check.check(&CancellationContext::none()).await,
        HealthStatus::Unhealthy { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_silent_output_times_out() {
    let logs = Arc::new(BufferedLogSource::new());
    let resource = MockServerBuilder::new("microcks", "/app")
        .unwrap()
        .with_readiness("Started MicrocksApplication", Duration::from_secs(5))
        .build();
    let check = resource.readiness_check(logs).unwrap();

    assert_eq!(
        check.watch(&CancellationContext::none()).await,
        ReadinessOutcome::TimedOut
    );
}

#[tokio::test]
async fn test_gate_with_minion_readiness() {
    let logs = Arc::new(BufferedLogSource::new());
    let resource = MockServerBuilder::new("microcks", "/app")
        .unwrap()
        .with_async_feature()
        .build();
    let minion = resource.async_minion().unwrap();

    let mut gate = HealthGate::new(Duration::from_millis(20));
    gate.add_check(
        minion.name(),
        Arc::new(minion.readiness_check(logs.clone()).unwrap()),
    );

    logs.publish(
        "microcks-async-minion",
        ["io.quarkus: Profile prod activated. Live Coding activated."],
    );
    gate.wait_until_healthy("microcks-async-minion", &CancellationContext::none())
        .await
        .unwrap();
    assert_eq!(
        gate.check_names("microcks-async-minion"),
        vec!["wait-for-output-health-check-microcks-async-minion"]
    );
}

#[test]
fn test_default_config_marker_matches_resource() {
    let config = Config::default();
    assert_eq!(config.readiness.marker, "Started MicrocksApplication");
    assert_eq!(config.readiness.timeout(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_backlog_keeps_only_recent_batches() {
    let logs = Arc::new(BufferedLogSource::with_backlog_capacity(2));
    logs.publish("microcks", ["Started MicrocksApplication in 2.1 seconds"]);
    logs.publish("microcks", ["GET /api/health 200"]);
    logs.publish("microcks", ["GET /api/health 200"]);
    assert_eq!(logs.backlog_len("microcks"), 2);
    logs.close("microcks");

    // The marker batch was evicted before this check subscribed.
    let resource = MockServerBuilder::new("microcks", "/app").unwrap().build();
    let check = resource.readiness_check(logs).unwrap();
    assert_eq!(
        check.watch(&CancellationContext::none()).await,
        ReadinessOutcome::StreamEnded
    );
}
