//! Configuration loading
//!
//! Handles:
//! - OS-specific default location (`<config_dir>/monic/config.toml`)
//! - TOML parsing into the engine's `MonitorConfig`
//! - `MONIC_*` environment overrides applied on top of the file

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use monic_core::config::{EmailConfig, EndpointCheck, MailgunConfig, StatsServerConfig, TelegramConfig};
use monic_core::{AlertLevel, MonitorConfig};
use tracing::{info, warn};

const ENV_PREFIX: &str = "MONIC_";

/// Get OS-specific config file path
pub fn config_file_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    path.push("monic");
    path.push("config.toml");
    Ok(path)
}

/// Loads the configuration file and applies environment overrides.
///
/// An explicit `path` must exist; the default location falls back to
/// built-in defaults when absent.
pub async fn load(path: Option<&Path>) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(path) => read_file(path).await?,
        None => {
            let default_path = config_file_path()?;
            if default_path.exists() {
                read_file(&default_path).await?
            } else {
                info!("No config file at {}, using defaults", default_path.display());
                MonitorConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

async fn read_file(path: &Path) -> Result<MonitorConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Environment lookup restricted to `MONIC_*` names, empty values ignored.
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.get(name)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring {}{}: cannot parse '{}'", ENV_PREFIX, name, raw);
                None
            }
        }
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let raw = self.get(name)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!("Ignoring {}{}: cannot parse '{}' as a boolean", ENV_PREFIX, name, raw);
                None
            }
        }
    }

    fn list(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    fn any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.get(n).is_some())
    }
}

/// Applies `MONIC_*` overrides. `lookup` receives full variable names.
pub fn apply_env_overrides<F>(config: &mut MonitorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    if let Some(name) = env.get("APP_NAME") {
        config.app_name = name;
    }

    let resources = &mut config.resources;
    if let Some(v) = env.parse("CHECK_SYSTEM_INTERVAL") {
        resources.interval_secs = v;
    }
    if let Some(v) = env.parse("CPU_THRESHOLD") {
        resources.cpu_threshold = v;
    }
    if let Some(v) = env.parse("MEMORY_THRESHOLD") {
        resources.memory_threshold = v;
    }
    if let Some(v) = env.parse("DISK_THRESHOLD") {
        resources.disk_threshold = v;
    }
    if let Some(paths) = env.list("DISK_PATHS") {
        resources.disk_paths = paths;
    }

    if let Some(url) = env.get("CHECK_HTTP_URL") {
        let mut check = EndpointCheck::new("http-check", url);
        if let Some(method) = env.get("CHECK_HTTP_METHOD") {
            check.method = method.to_ascii_uppercase();
        }
        if let Some(v) = env.parse("CHECK_HTTP_TIMEOUT") {
            check.timeout_secs = v;
        }
        if let Some(v) = env.parse("CHECK_HTTP_EXPECTED_STATUS") {
            check.expected_status = v;
        }
        let checks = &mut config.endpoints.checks;
        if checks.is_empty() {
            checks.push(check);
        } else {
            checks[0] = check;
        }
    }

    if env.any(&["CHECK_DOCKER_INTERVAL", "CHECK_DOCKER_CONTAINERS"]) {
        config.containers.enabled = true;
    }
    if let Some(v) = env.parse("CHECK_DOCKER_INTERVAL") {
        config.containers.interval_secs = v;
    }
    if let Some(names) = env.list("CHECK_DOCKER_CONTAINERS") {
        config.containers.names = names;
    }

    apply_alerting_overrides(config, &env);
    apply_server_overrides(config, &env);
}

fn apply_alerting_overrides<F: Fn(&str) -> Option<String>>(config: &mut MonitorConfig, env: &Env<F>) {
    let alerting = &mut config.alerting;

    if let Some(levels) = env.list("ALERTING_LEVELS") {
        alerting.levels = levels
            .iter()
            .filter_map(|l| match l.parse::<AlertLevel>() {
                Ok(level) => Some(level),
                Err(e) => {
                    warn!("Ignoring alert level in {}ALERTING_LEVELS: {}", ENV_PREFIX, e);
                    None
                }
            })
            .collect();
    }
    if let Some(v) = env.parse("ALERTING_COOLDOWN") {
        alerting.cooldown_minutes = v;
    }

    if env.any(&["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"]) {
        let telegram = alerting.telegram.get_or_insert_with(TelegramConfig::default);
        if let Some(v) = env.get("TELEGRAM_BOT_TOKEN") {
            telegram.bot_token = v;
        }
        if let Some(v) = env.get("TELEGRAM_CHAT_ID") {
            telegram.chat_id = v;
        }
        alerting.enabled = true;
    }

    if env.any(&["MAILGUN_API_KEY", "MAILGUN_DOMAIN", "MAILGUN_FROM", "MAILGUN_TO"]) {
        let mailgun = alerting.mailgun.get_or_insert_with(MailgunConfig::default);
        if let Some(v) = env.get("MAILGUN_API_KEY") {
            mailgun.api_key = v;
        }
        if let Some(v) = env.get("MAILGUN_DOMAIN") {
            mailgun.domain = v;
        }
        if let Some(v) = env.get("MAILGUN_FROM") {
            mailgun.from = v;
        }
        if let Some(v) = env.get("MAILGUN_TO") {
            mailgun.to = v;
        }
        alerting.enabled = true;
    }

    let smtp_vars = [
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "SMTP_FROM",
        "SMTP_TO",
        "SMTP_USE_TLS",
    ];
    if env.any(&smtp_vars) {
        let email = alerting.email.get_or_insert_with(EmailConfig::default);
        if let Some(v) = env.get("SMTP_HOST") {
            email.smtp_host = v;
        }
        if let Some(v) = env.parse("SMTP_PORT") {
            email.smtp_port = v;
        }
        if let Some(v) = env.get("SMTP_USERNAME") {
            email.username = v;
        }
        if let Some(v) = env.get("SMTP_PASSWORD") {
            email.password = v;
        }
        if let Some(v) = env.get("SMTP_FROM") {
            email.from = v;
        }
        if let Some(v) = env.get("SMTP_TO") {
            email.to = v;
        }
        if let Some(v) = env.bool("SMTP_USE_TLS") {
            email.use_tls = v;
        }
        alerting.enabled = true;
    }
}

fn apply_server_overrides<F: Fn(&str) -> Option<String>>(config: &mut MonitorConfig, env: &Env<F>) {
    if !env.any(&["HTTP_SERVER_PORT", "HTTP_SERVER_USERNAME", "HTTP_SERVER_PASSWORD"]) {
        return;
    }
    let server = config.http_server.get_or_insert_with(StatsServerConfig::default);
    if let Some(v) = env.parse("HTTP_SERVER_PORT") {
        server.port = v;
    }
    if let Some(v) = env.get("HTTP_SERVER_USERNAME") {
        server.username = Some(v);
    }
    if let Some(v) = env.get("HTTP_SERVER_PASSWORD") {
        server.password = Some(v);
    }
}
