//! Samples produced by collaborators and the alert events derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resource sample (CPU, memory, configured disks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    pub disks: Vec<DiskUsage>,
}

/// Memory usage metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
}

/// Disk usage for one configured path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub path: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f64,
}

impl ResourceSample {
    /// Compact `path:pct` summary used in cycle logs.
    pub fn disk_summary(&self) -> String {
        let parts: Vec<String> = self
            .disks
            .iter()
            .map(|d| format!("{}:{:.1}%", d.path, d.used_percent))
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

/// Outcome of one endpoint probe. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointResult {
    pub name: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Status of one container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    pub container_id: String,
    pub name: String,
    pub status: String,
    pub state: String,
    pub running: bool,
    pub restart_count: u32,
    pub exit_code: i64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Severity carried by an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            other => Err(format!("unknown alert level: {}", other)),
        }
    }
}

/// An alert or recovery notice waiting for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub level: AlertLevel,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        alert_type: impl Into<String>,
        message: impl Into<String>,
        level: AlertLevel,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            message: message.into(),
            level,
            timestamp,
        }
    }
}
