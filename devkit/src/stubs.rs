/*!
Scripted collaborators

Each stub replays a script the test sets up front and records what the
engine asked of it. Scripts repeat their last entry once exhausted.
*/

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use monic_core::config::EndpointCheck;
use monic_core::{
    AlertChannel, AlertEvent, ContainerLister, ContainerSample, DiskUsage, EndpointProber, EndpointResult,
    MemoryUsage, MonitorError, ResourceCollector, ResourceSample, Result,
};
use parking_lot::Mutex;
use tracing::info;

const GIB: u64 = 1024 * 1024 * 1024;

/// Builds a sample with the given CPU, memory and per-path disk usage.
pub fn resource_sample(cpu: f64, memory: f64, disks: &[(&str, f64)]) -> ResourceSample {
    let total = 16 * GIB;
    let used = (total as f64 * memory / 100.0) as u64;
    ResourceSample {
        timestamp: Utc::now(),
        cpu_percent: cpu,
        memory: MemoryUsage {
            total_bytes: total,
            used_bytes: used,
            free_bytes: total - used,
            used_percent: memory,
        },
        disks: disks
            .iter()
            .map(|(path, pct)| {
                let total = 100 * GIB;
                let used = (total as f64 * pct / 100.0) as u64;
                DiskUsage {
                    path: path.to_string(),
                    total_bytes: total,
                    used_bytes: used,
                    free_bytes: total - used,
                    used_percent: *pct,
                }
            })
            .collect(),
    }
}

/// Replays resource samples in order.
#[derive(Default)]
pub struct ScriptedResourceCollector {
    script: Mutex<VecDeque<Result<ResourceSample>>>,
    last: Mutex<Option<ResourceSample>>,
    calls: AtomicUsize,
}

impl ScriptedResourceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script of CPU readings; memory and disk stay low.
    pub fn with_cpu(values: &[f64]) -> Self {
        let collector = Self::new();
        for value in values {
            collector.push(resource_sample(*value, 20.0, &[("/", 30.0)]));
        }
        collector
    }

    pub fn push(&self, sample: ResourceSample) {
        self.script.lock().push_back(Ok(sample));
    }

    /// Next collection fails with `message`.
    pub fn push_error(&self, message: &str) {
        self.script
            .lock()
            .push_back(Err(MonitorError::Collection(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceCollector for ScriptedResourceCollector {
    async fn collect(&self, _disk_paths: &[String]) -> Result<ResourceSample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(mut sample)) => {
                sample.timestamp = Utc::now();
                *self.last.lock() = Some(sample.clone());
                Ok(sample)
            }
            Some(Err(e)) => Err(e),
            None => {
                let last = self.last.lock().clone();
                last.map(|mut sample| {
                    sample.timestamp = Utc::now();
                    sample
                })
                .ok_or_else(|| MonitorError::Collection("no scripted sample".into()))
            }
        }
    }
}

/// Per-endpoint script of status codes; `None` means connection refused.
/// Unscripted endpoints answer with their expected status.
#[derive(Default)]
pub struct ScriptedProber {
    script: Mutex<HashMap<String, VecDeque<Option<u16>>>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: &str, statuses: &[Option<u16>]) {
        self.script
            .lock()
            .entry(name.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Names of the endpoints probed, in call order.
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl EndpointProber for ScriptedProber {
    async fn probe(&self, check: &EndpointCheck) -> Result<EndpointResult> {
        self.probed.lock().push(check.name.clone());

        let status = {
            let mut script = self.script.lock();
            match script.get_mut(&check.name) {
                Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
                Some(queue) => queue.front().copied().flatten(),
                None => Some(check.expected_status),
            }
        };

        let (success, error) = match status {
            Some(code) if code == check.expected_status => (true, None),
            Some(code) => (
                false,
                Some(format!("unexpected status code: {} (expected: {})", code, check.expected_status)),
            ),
            None => (false, Some("request failed: connection refused".to_string())),
        };

        Ok(EndpointResult {
            name: check.name.clone(),
            url: check.url.clone(),
            status_code: status,
            latency_ms: 5,
            success,
            error,
            timestamp: Utc::now(),
        })
    }
}

/// Builds a container sample.
pub fn container(name: &str, running: bool, exit_code: i64) -> ContainerSample {
    ContainerSample {
        container_id: format!("{:0>12}", name.len()),
        name: name.to_string(),
        status: if running { "Up 2 hours".into() } else { format!("Exited ({})", exit_code) },
        state: if running { "running".into() } else { "exited".into() },
        running,
        restart_count: 0,
        exit_code,
        error: None,
        timestamp: Utc::now(),
    }
}

/// Returns whatever container list the test last set.
pub struct StaticContainerLister {
    available: bool,
    containers: Mutex<Vec<ContainerSample>>,
}

impl StaticContainerLister {
    pub fn new(containers: Vec<ContainerSample>) -> Self {
        Self {
            available: true,
            containers: Mutex::new(containers),
        }
    }

    /// A runtime whose initialization fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            containers: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, containers: Vec<ContainerSample>) {
        *self.containers.lock() = containers;
    }
}

#[async_trait]
impl ContainerLister for StaticContainerLister {
    async fn initialize(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(MonitorError::Containers("runtime not running".into()))
        }
    }

    async fn list(&self, names: &[String]) -> Result<Vec<ContainerSample>> {
        let containers = self.containers.lock();
        Ok(containers
            .iter()
            .filter(|c| names.is_empty() || names.contains(&c.name))
            .map(|c| ContainerSample {
                timestamp: Utc::now(),
                ..c.clone()
            })
            .collect())
    }
}

/// Records every alert it is asked to send.
pub struct RecordingChannel {
    name: String,
    sent: Mutex<Vec<AlertEvent>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<AlertEvent> {
        self.sent.lock().clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent.lock().iter().map(|a| a.alert_type.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &AlertEvent) -> Result<()> {
        info!(channel = %self.name, alert_type = %alert.alert_type, "[STUB] Alert recorded");
        self.sent.lock().push(alert.clone());
        Ok(())
    }
}

/// Fails every send with a fixed message.
pub struct FailingChannel {
    name: String,
    message: String,
    attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertChannel for FailingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _alert: &AlertEvent) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MonitorError::channel(&self.name, self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resource_script_repeats_last_sample() {
        let collector = ScriptedResourceCollector::with_cpu(&[10.0, 95.0]);
        assert_eq!(collector.collect(&[]).await.unwrap().cpu_percent, 10.0);
        assert_eq!(collector.collect(&[]).await.unwrap().cpu_percent, 95.0);
        assert_eq!(collector.collect(&[]).await.unwrap().cpu_percent, 95.0);
        assert_eq!(collector.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_resource_script_errors() {
        let collector = ScriptedResourceCollector::new();
        assert!(collector.collect(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_prober_script() {
        let prober = ScriptedProber::new();
        prober.script("api", &[Some(500), None]);
        let check = EndpointCheck::new("api", "https://api.example.com/health");

        let first = prober.probe(&check).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.status_code, Some(500));

        let second = prober.probe(&check).await.unwrap();
        assert_eq!(second.status_code, None);
        assert_eq!(second.error.as_deref(), Some("request failed: connection refused"));

        let other = prober.probe(&EndpointCheck::new("web", "https://example.com")).await.unwrap();
        assert!(other.success);
        assert_eq!(prober.probed(), vec!["api", "api", "web"]);
    }

    #[tokio::test]
    async fn test_container_filter() {
        let lister = StaticContainerLister::new(vec![container("web", true, 0), container("db", false, 1)]);
        assert_eq!(lister.list(&[]).await.unwrap().len(), 2);
        let only_db = lister.list(&["db".to_string()]).await.unwrap();
        assert_eq!(only_db.len(), 1);
        assert!(!only_db[0].running);
        assert!(StaticContainerLister::unavailable().initialize().await.is_err());
    }
}
