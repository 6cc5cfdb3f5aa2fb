//! End-to-end engine behaviour through the scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use monic_core::config::EndpointCheck;
use monic_core::{AlertChannel, AlertLevel, Category};
use monic_devkit::stubs::container;
use monic_devkit::{FailingChannel, ScriptedResourceCollector, StaticContainerLister, TestHarness};
use serde_json::json;

#[tokio::test]
async fn cpu_spike_alerts_once_then_recovers() {
    let harness = TestHarness::new(
        TestHarness::config(),
        ScriptedResourceCollector::with_cpu(&[70.0, 85.0, 90.0, 92.0, 60.0]),
    );

    assert_eq!(harness.run_resource_cycles(3).await, 0);
    assert_eq!(harness.run_resource_cycles(1).await, 1);
    assert_eq!(harness.run_resource_cycles(1).await, 1);

    assert_eq!(harness.dispatch().await, 2);
    let sent = harness.channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].alert_type, "cpu");
    assert_eq!(sent[0].level, AlertLevel::Critical);
    assert_eq!(sent[0].message, "CPU usage is 92.0% (threshold: 80.0%)");
    assert_eq!(sent[1].level, AlertLevel::Warning);
    assert!(sent[1].message.starts_with("CPU usage recovered to 60.0%"));

    assert_eq!(harness.monitor.history().count(Category::Resources), 5);
    assert_eq!(harness.monitor.history().count(Category::Alerts), 2);
    harness.assert_status_field("pending_alerts", &json!(0)).unwrap();
}

#[tokio::test]
async fn sustained_breach_alerts_only_once() {
    let harness = TestHarness::new(
        TestHarness::config(),
        ScriptedResourceCollector::with_cpu(&[95.0]),
    );

    assert_eq!(harness.run_resource_cycles(10).await, 1);
    harness.dispatch().await;
    assert_eq!(harness.channel.sent_types(), vec!["cpu"]);
}

#[tokio::test]
async fn failing_channel_does_not_block_others() {
    let failing = Arc::new(FailingChannel::new("telegram", "Telegram API returned status 502"));
    let harness = TestHarness::with_channels(
        TestHarness::config(),
        ScriptedResourceCollector::with_cpu(&[99.0]),
        StaticContainerLister::new(Vec::new()),
        vec![failing.clone() as Arc<dyn AlertChannel>],
    );

    harness.run_resource_cycles(3).await;
    let events = harness.monitor.queue().drain();
    assert_eq!(events.len(), 1);

    let err = harness.monitor.dispatcher().dispatch(&events).await.unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].channel, "telegram");
    assert!(err.to_string().contains("telegram[cpu]: Telegram API returned status 502"));

    assert_eq!(harness.channel.count(), 1);
    assert_eq!(failing.attempts(), 1);
}

#[tokio::test]
async fn failed_dispatch_still_records_history_and_cooldown() {
    let failing = Arc::new(FailingChannel::new("mailgun", "Mailgun API returned status 401"));
    let mut config = TestHarness::config();
    config.alerting.cooldown_minutes = 10;
    let harness = TestHarness::with_channels(
        config,
        ScriptedResourceCollector::with_cpu(&[99.0]),
        StaticContainerLister::new(Vec::new()),
        vec![failing.clone() as Arc<dyn AlertChannel>],
    );

    harness.run_resource_cycles(3).await;
    assert_eq!(harness.dispatch().await, 1);

    assert_eq!(harness.monitor.history().count(Category::Alerts), 1);
    assert!(harness.monitor.dispatcher().last_sent("cpu").is_some());
}

#[tokio::test]
async fn cooldown_suppresses_repeat_of_same_type() {
    let mut config = TestHarness::config();
    config.alerting.cooldown_minutes = 10;
    let harness = TestHarness::new(
        config,
        ScriptedResourceCollector::with_cpu(&[95.0, 95.0, 95.0, 40.0]),
    );

    assert_eq!(harness.run_resource_cycles(4).await, 2);
    assert_eq!(harness.dispatch().await, 2);

    // Recovery shares the `cpu` type with the alert and lands in the window.
    let sent = harness.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].level, AlertLevel::Critical);
    assert_eq!(harness.monitor.history().count(Category::Alerts), 2);
}

#[tokio::test]
async fn level_filter_drops_recoveries() {
    let mut config = TestHarness::config();
    config.alerting.levels = vec![AlertLevel::Critical];
    let harness = TestHarness::new(
        config,
        ScriptedResourceCollector::with_cpu(&[95.0, 95.0, 95.0, 40.0]),
    );

    harness.run_resource_cycles(4).await;
    harness.dispatch().await;
    let sent = harness.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].level, AlertLevel::Critical);
}

#[tokio::test]
async fn disabled_alerting_records_but_sends_nothing() {
    let mut config = TestHarness::config();
    config.alerting.enabled = false;
    let harness = TestHarness::new(config, ScriptedResourceCollector::with_cpu(&[95.0]));

    harness.run_resource_cycles(3).await;
    assert_eq!(harness.dispatch().await, 1);
    assert_eq!(harness.channel.count(), 0);
    assert_eq!(harness.monitor.history().count(Category::Alerts), 1);
}

#[tokio::test]
async fn collection_error_skips_the_cycle() {
    let collector = ScriptedResourceCollector::new();
    collector.push_error("sysinfo unavailable");
    let harness = TestHarness::new(TestHarness::config(), collector);

    assert_eq!(harness.run_resource_cycles(1).await, 0);
    assert_eq!(harness.monitor.history().count(Category::Resources), 0);
    assert!(harness.monitor.states().is_empty());
}

#[tokio::test]
async fn endpoint_outage_and_recovery() {
    let mut config = TestHarness::config();
    config.endpoints.checks = vec![
        EndpointCheck::new("api", "https://api.example.com/health"),
        EndpointCheck::new("web", "https://www.example.com"),
    ];
    let harness = TestHarness::new(config, ScriptedResourceCollector::new());
    harness.prober.script("api", &[Some(500), None, Some(503), Some(200)]);

    assert_eq!(harness.run_endpoint_cycles(2).await, 0);
    assert_eq!(harness.run_endpoint_cycles(1).await, 1);
    assert_eq!(harness.run_endpoint_cycles(1).await, 1);

    harness.dispatch().await;
    let sent = harness.channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].alert_type, "http_api");
    assert_eq!(sent[0].message, "unexpected status code: 503 (expected: 200)");
    assert_eq!(sent[1].message, "api is reachable again (status 200)");

    assert_eq!(harness.monitor.history().count(Category::Endpoints), 8);
    let latest = harness.monitor.history().latest_endpoint("api").unwrap();
    assert!(latest.success);
    assert_eq!(harness.prober.probed().len(), 8);
}

#[tokio::test]
async fn stopped_container_is_debounced() {
    let harness = TestHarness::with_channels(
        TestHarness::config(),
        ScriptedResourceCollector::new(),
        StaticContainerLister::new(vec![container("web", true, 0), container("db", false, 1)]),
        Vec::new(),
    );

    assert_eq!(harness.run_container_cycles(2).await, 0);
    assert_eq!(harness.run_container_cycles(1).await, 1);

    harness.containers.set(vec![container("web", true, 0), container("db", true, 0)]);
    assert_eq!(harness.run_container_cycles(1).await, 1);

    harness.dispatch().await;
    assert_eq!(harness.channel.sent_types(), vec!["docker_db", "docker_db"]);
    assert_eq!(harness.channel.sent()[1].message, "Container db is running again");
}

#[tokio::test]
async fn killed_container_is_not_a_problem() {
    let harness = TestHarness::with_channels(
        TestHarness::config(),
        ScriptedResourceCollector::new(),
        StaticContainerLister::new(vec![container("worker", true, 137)]),
        Vec::new(),
    );

    assert_eq!(harness.run_container_cycles(5).await, 0);
}

#[tokio::test(start_paused = true)]
async fn scheduled_tasks_alert_and_stop() {
    let mut config = TestHarness::config();
    config.alerting.dispatch_interval_secs = 2;
    let harness = TestHarness::new(config, ScriptedResourceCollector::with_cpu(&[95.0]));

    let handle = harness.monitor.clone().start().await;
    assert_eq!(handle.task_names(), vec!["resources", "endpoints", "dispatch"]);

    tokio::time::sleep(Duration::from_millis(4500)).await;
    handle.shutdown().await;

    assert_eq!(harness.resources.calls(), 4);
    assert_eq!(harness.channel.sent_types(), vec!["cpu"]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.resources.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn unavailable_runtime_skips_container_task() {
    let mut config = TestHarness::config();
    config.containers.enabled = true;
    let harness = TestHarness::with_channels(
        config,
        ScriptedResourceCollector::with_cpu(&[10.0]),
        StaticContainerLister::unavailable(),
        Vec::new(),
    );

    let handle = harness.monitor.clone().start().await;
    assert!(!handle.task_names().contains(&"containers"));
    handle.shutdown().await;
}
