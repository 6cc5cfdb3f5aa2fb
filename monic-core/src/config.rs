//! Engine configuration.
//!
//! Plain serde types with defaults; loading from disk and the environment
//! lives in the binary. [`MonitorConfig::validate`] is the single startup
//! gate: anything it rejects is fatal before a task is spawned.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::history::DEFAULT_CAPACITY;
use crate::models::AlertLevel;

const VALID_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub resources: ResourceChecks,

    #[serde(default)]
    pub endpoints: EndpointChecks,

    #[serde(default)]
    pub containers: ContainerChecks,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub http_server: Option<StatsServerConfig>,
}

/// Resource sampling interval and per-metric thresholds (percent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChecks {
    #[serde(default = "default_resource_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold: f64,
    #[serde(default = "default_disk_paths")]
    pub disk_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointChecks {
    #[serde(default = "default_endpoint_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    #[serde(default)]
    pub checks: Vec<EndpointCheck>,
}

/// One HTTP(S) endpoint to probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCheck {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

impl EndpointCheck {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            timeout_secs: default_probe_timeout(),
            expected_status: default_expected_status(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MonitorError::InvalidConfig(format!("endpoint '{}': {}", self.name, msg)));

        if self.name.trim().is_empty() {
            return Err(MonitorError::InvalidConfig("endpoint name cannot be empty".into()));
        }
        if self.url.is_empty() {
            return invalid("URL cannot be empty".into());
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return invalid("URL must start with http:// or https://".into());
        }
        if self.method.is_empty() {
            return invalid("HTTP method cannot be empty".into());
        }
        if !VALID_METHODS.contains(&self.method.to_ascii_uppercase().as_str()) {
            return invalid(format!("invalid HTTP method: {}", self.method));
        }
        if self.timeout_secs == 0 {
            return invalid("timeout must be positive".into());
        }
        if !(100..=599).contains(&self.expected_status) {
            return invalid("expected status code must be between 100 and 599".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerChecks {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_container_interval")]
    pub interval_secs: u64,
    /// Containers to watch; empty means all.
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Allowed levels; empty allows every level.
    #[serde(default)]
    pub levels: Vec<AlertLevel>,
    #[serde(default)]
    pub cooldown_minutes: u64,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub mailgun: Option<MailgunConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl AlertingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }

    pub fn has_channel(&self) -> bool {
        self.email.is_some() || self.mailgun.is_some() || self.telegram.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(email) = &self.email {
            email.validate()?;
        }
        if let Some(mailgun) = &self.mailgun {
            mailgun.validate()?;
        }
        if let Some(telegram) = &self.telegram {
            telegram.validate()?;
        }
        if !self.has_channel() {
            return Err(MonitorError::InvalidConfig(
                "alerting is enabled but no alerting methods are configured".into(),
            ));
        }
        Ok(())
    }
}

/// SMTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub use_tls: bool,
}

impl EmailConfig {
    fn validate(&self) -> Result<()> {
        let missing = |what: &str| Err(MonitorError::ChannelNotConfigured(format!("email: {}", what)));
        if self.smtp_host.is_empty() {
            return missing("SMTP host is required");
        }
        if self.smtp_port == 0 {
            return missing("SMTP port must be positive");
        }
        if self.from.is_empty() {
            return missing("from address is required");
        }
        if self.to.is_empty() {
            return missing("to address is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default = "default_mailgun_base_url")]
    pub base_url: String,
}

impl MailgunConfig {
    fn validate(&self) -> Result<()> {
        let missing = |what: &str| Err(MonitorError::ChannelNotConfigured(format!("mailgun: {}", what)));
        if self.api_key.is_empty() {
            return missing("API key is required");
        }
        if self.domain.is_empty() {
            return missing("domain is required");
        }
        if self.from.is_empty() {
            return missing("from address is required");
        }
        if self.to.is_empty() {
            return missing("to address is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl TelegramConfig {
    fn validate(&self) -> Result<()> {
        let missing = |what: &str| Err(MonitorError::ChannelNotConfigured(format!("telegram: {}", what)));
        if self.bot_token.is_empty() {
            return missing("bot token is required");
        }
        if self.chat_id.is_empty() {
            return missing("chat ID is required");
        }
        Ok(())
    }
}

/// Read-only stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        let r = &self.resources;
        for (name, value) in [("cpu", r.cpu_threshold), ("memory", r.memory_threshold), ("disk", r.disk_threshold)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} threshold must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        let intervals = [
            ("resources", r.interval_secs),
            ("endpoints", self.endpoints.interval_secs),
            ("containers", self.containers.interval_secs),
            ("dispatch", self.alerting.dispatch_interval_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(MonitorError::InvalidConfig(format!("{} interval must be positive", name)));
            }
        }

        let mut names = HashSet::new();
        for check in &self.endpoints.checks {
            check.validate()?;
            if !names.insert(check.name.as_str()) {
                return Err(MonitorError::InvalidConfig(format!("duplicate endpoint name: {}", check.name)));
            }
        }

        self.alerting.validate()?;

        if let Some(server) = &self.http_server {
            if server.username.is_some() && server.password.as_deref().unwrap_or_default().is_empty() {
                return Err(MonitorError::InvalidConfig(
                    "stats server username requires a password".into(),
                ));
            }
        }

        Ok(())
    }
}

fn default_app_name() -> String {
    "Monic".to_string()
}

fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_resource_interval() -> u64 {
    60
}

fn default_cpu_threshold() -> f64 {
    80.0
}

fn default_memory_threshold() -> f64 {
    80.0
}

fn default_disk_threshold() -> f64 {
    90.0
}

fn default_disk_paths() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_endpoint_interval() -> u64 {
    30
}

fn default_max_concurrent_probes() -> usize {
    8
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_expected_status() -> u16 {
    200
}

fn default_container_interval() -> u64 {
    60
}

fn default_dispatch_interval() -> u64 {
    60
}

fn default_mailgun_base_url() -> String {
    "https://api.mailgun.net/v3".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            history_capacity: default_history_capacity(),
            resources: ResourceChecks::default(),
            endpoints: EndpointChecks::default(),
            containers: ContainerChecks::default(),
            alerting: AlertingConfig::default(),
            http_server: None,
        }
    }
}

impl Default for ResourceChecks {
    fn default() -> Self {
        Self {
            interval_secs: default_resource_interval(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            disk_threshold: default_disk_threshold(),
            disk_paths: default_disk_paths(),
        }
    }
}

impl Default for EndpointChecks {
    fn default() -> Self {
        Self {
            interval_secs: default_endpoint_interval(),
            max_concurrent_probes: default_max_concurrent_probes(),
            checks: Vec::new(),
        }
    }
}

impl Default for ContainerChecks {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_container_interval(),
            names: Vec::new(),
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            levels: Vec::new(),
            cooldown_minutes: 0,
            dispatch_interval_secs: default_dispatch_interval(),
            email: None,
            mailgun: None,
            telegram: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api_base(),
        }
    }
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            domain: String::new(),
            from: String::new(),
            to: String::new(),
            base_url: default_mailgun_base_url(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: String::new(),
            use_tls: true,
        }
    }
}

impl Default for StatsServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            username: None,
            password: None,
        }
    }
}
