/*!
Test harness for the monitoring engine

Wires the scripted collaborators into a [`Monitor`] and offers helpers to
drive cycles by hand and assert on the reported status.
*/

use std::sync::Arc;

use anyhow::Result;
use monic_core::{AlertChannel, Collaborators, ContainerLister, Monitor, MonitorConfig};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::stubs::{RecordingChannel, ScriptedProber, ScriptedResourceCollector, StaticContainerLister};

/// Installs a test-writer subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monic_core=debug")))
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub monitor: Arc<Monitor>,
    pub resources: Arc<ScriptedResourceCollector>,
    pub prober: Arc<ScriptedProber>,
    pub containers: Arc<StaticContainerLister>,
    pub channel: Arc<RecordingChannel>,
}

impl TestHarness {
    /// Alerting on, no cooldown, one-second intervals, a recording channel.
    pub fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.resources.interval_secs = 1;
        config.resources.disk_paths = vec!["/".into()];
        config.endpoints.interval_secs = 1;
        config.containers.interval_secs = 1;
        config.alerting.enabled = true;
        config.alerting.cooldown_minutes = 0;
        config.alerting.dispatch_interval_secs = 1;
        config
    }

    pub fn new(config: MonitorConfig, resources: ScriptedResourceCollector) -> Self {
        Self::with_channels(config, resources, StaticContainerLister::new(Vec::new()), Vec::new())
    }

    /// Builds the harness; `extra_channels` are registered after the
    /// recording channel.
    pub fn with_channels(
        config: MonitorConfig,
        resources: ScriptedResourceCollector,
        containers: StaticContainerLister,
        extra_channels: Vec<Arc<dyn AlertChannel>>,
    ) -> Self {
        init_tracing();

        let resources = Arc::new(resources);
        let prober = Arc::new(ScriptedProber::new());
        let containers = Arc::new(containers);
        let channel = Arc::new(RecordingChannel::new("recording"));

        let mut channels: Vec<Arc<dyn AlertChannel>> = vec![channel.clone()];
        channels.extend(extra_channels);

        let monitor = Monitor::new(
            config,
            Collaborators {
                resources: resources.clone(),
                prober: prober.clone(),
                containers: Some(containers.clone() as Arc<dyn ContainerLister>),
                channels,
            },
        );

        Self {
            monitor: Arc::new(monitor),
            resources,
            prober,
            containers,
            channel,
        }
    }

    /// Runs `n` resource cycles and returns how many events they queued.
    pub async fn run_resource_cycles(&self, n: usize) -> usize {
        let mut queued = 0;
        for _ in 0..n {
            queued += self.monitor.run_resource_cycle().await;
        }
        queued
    }

    pub async fn run_endpoint_cycles(&self, n: usize) -> usize {
        let mut queued = 0;
        for _ in 0..n {
            queued += self.monitor.run_endpoint_cycle().await;
        }
        queued
    }

    pub async fn run_container_cycles(&self, n: usize) -> usize {
        let mut queued = 0;
        for _ in 0..n {
            queued += self.monitor.run_container_cycle().await;
        }
        queued
    }

    pub async fn dispatch(&self) -> usize {
        self.monitor.run_dispatch_cycle().await
    }

    pub fn status_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.monitor.status())?)
    }

    /// Asserts a dotted path in the service status JSON equals `expected`.
    pub fn assert_status_field(&self, field_path: &str, expected: &Value) -> Result<()> {
        let status = self.status_json()?;
        match nested_field(&status, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found in service status", field_path),
        }
    }
}

fn nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(obj) => obj.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
