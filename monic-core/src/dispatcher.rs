//! Alert dispatch: level allow-list, per-type cooldown, fan-out to channels.
//!
//! The cooldown slot for a type is claimed under the lock before any channel
//! is contacted, so overlapping dispatch calls can never both send the same
//! type inside one window. The claim stands whatever the channels report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collectors::AlertChannel;
use crate::config::AlertingConfig;
use crate::error::{ChannelFailure, MonitorError, Result};
use crate::models::{AlertEvent, AlertLevel};

pub struct Dispatcher {
    enabled: bool,
    levels: Vec<AlertLevel>,
    cooldown: Duration,
    channels: Vec<Arc<dyn AlertChannel>>,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Dispatcher {
    pub fn new(config: &AlertingConfig, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            enabled: config.enabled,
            levels: config.levels.clone(),
            cooldown: config.cooldown(),
            channels,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Last time an alert of `alert_type` went out.
    pub fn last_sent(&self, alert_type: &str) -> Option<DateTime<Utc>> {
        self.last_sent.lock().get(alert_type).copied()
    }

    fn level_allowed(&self, level: AlertLevel) -> bool {
        self.levels.is_empty() || self.levels.contains(&level)
    }

    /// Checks the cooldown for `alert_type` and records `now` when it passes.
    fn claim(&self, alert_type: &str, now: DateTime<Utc>) -> bool {
        let mut last_sent = self.last_sent.lock();
        if !self.cooldown.is_zero() {
            if let Some(previous) = last_sent.get(alert_type) {
                let within_window = (now - *previous)
                    .to_std()
                    .map_or(true, |elapsed| elapsed < self.cooldown);
                if within_window {
                    return false;
                }
            }
        }
        last_sent.insert(alert_type.to_string(), now);
        true
    }

    /// Sends `events` through every channel, returning how many events
    /// passed the filters. Channel failures are collected into one
    /// [`MonitorError::Dispatch`].
    pub async fn dispatch(&self, events: &[AlertEvent]) -> Result<usize> {
        self.dispatch_at(events, Utc::now()).await
    }

    pub async fn dispatch_at(&self, events: &[AlertEvent], now: DateTime<Utc>) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let mut delivered = 0;
        let mut failures = Vec::new();

        for event in events {
            if !self.level_allowed(event.level) {
                debug!(alert_type = %event.alert_type, level = %event.level, "Alert level filtered out");
                continue;
            }
            if !self.claim(&event.alert_type, now) {
                debug!(alert_type = %event.alert_type, "Alert suppressed by cooldown");
                continue;
            }

            delivered += 1;
            let results = join_all(self.channels.iter().map(|c| c.send(event))).await;
            for (channel, result) in self.channels.iter().zip(results) {
                match result {
                    Ok(()) => info!(
                        channel = channel.name(),
                        alert_type = %event.alert_type,
                        level = %event.level,
                        "Alert sent"
                    ),
                    Err(e) => {
                        warn!(channel = channel.name(), alert_type = %event.alert_type, "Alert delivery failed: {}", e);
                        failures.push(ChannelFailure {
                            channel: channel.name().to_string(),
                            alert_type: event.alert_type.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            Err(MonitorError::Dispatch(failures))
        }
    }
}

/// `[<App> Alert] <LEVEL> - <type>`
pub fn subject(app_name: &str, alert: &AlertEvent) -> String {
    format!(
        "[{} Alert] {} - {}",
        app_name,
        alert.level.as_str().to_uppercase(),
        alert.alert_type
    )
}

/// Plain-text notification body used by the mail channels.
pub fn plain_body(app_name: &str, alert: &AlertEvent, server_time: DateTime<Utc>) -> String {
    let mut body = String::new();
    body.push_str(&format!("{} MONITORING ALERT\n", app_name.to_uppercase()));
    body.push_str("=====================\n\n");
    body.push_str(&format!("Alert Level: {}\n", alert.level.as_str().to_uppercase()));
    body.push_str(&format!("Alert Type: {}\n", alert.alert_type));
    body.push_str(&format!("Message: {}\n", alert.message));
    body.push_str(&format!("Timestamp: {}\n", alert.timestamp.to_rfc2822()));
    body.push_str(&format!("Server Time: {}\n\n", server_time.to_rfc2822()));
    body.push_str(&format!("This alert was generated by the {} monitoring service.\n", app_name));
    body
}

/// HTML message for chat channels.
pub fn html_message(app_name: &str, alert: &AlertEvent) -> String {
    format!(
        "<b>{}</b>\n\nMessage: {}\nTime: {}",
        escape_html(&subject(app_name, alert)),
        escape_html(&alert.message),
        alert.timestamp.to_rfc2822()
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    struct FakeChannel {
        name: &'static str,
        fail: bool,
        sent: Mutex<Vec<AlertEvent>>,
    }

    impl FakeChannel {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl AlertChannel for FakeChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, alert: &AlertEvent) -> Result<()> {
            self.sent.lock().push(alert.clone());
            if self.fail {
                return Err(MonitorError::channel(self.name, "connection refused"));
            }
            Ok(())
        }
    }

    fn config(levels: Vec<AlertLevel>, cooldown_minutes: u64) -> AlertingConfig {
        AlertingConfig {
            enabled: true,
            levels,
            cooldown_minutes,
            ..AlertingConfig::default()
        }
    }

    fn event(alert_type: &str, level: AlertLevel) -> AlertEvent {
        AlertEvent::new(alert_type, "something happened", level, Utc::now())
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_mask_success() {
        let good = FakeChannel::new("telegram", false);
        let bad = FakeChannel::new("email", true);
        let dispatcher = Dispatcher::new(&config(vec![], 0), vec![bad.clone(), good.clone()]);

        let err = dispatcher
            .dispatch(&[event("cpu", AlertLevel::Critical)])
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].channel, "email");
        assert!(!err.to_string().contains("telegram"));
        assert_eq!(good.sent(), 1);
        assert!(dispatcher.last_sent("cpu").is_some());
    }

    #[tokio::test]
    async fn test_disabled_sends_nothing() {
        let channel = FakeChannel::new("telegram", false);
        let mut cfg = config(vec![], 0);
        cfg.enabled = false;
        let dispatcher = Dispatcher::new(&cfg, vec![channel.clone()]);

        let delivered = dispatcher.dispatch(&[event("cpu", AlertLevel::Critical)]).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(channel.sent(), 0);
    }

    #[tokio::test]
    async fn test_level_allow_list() {
        let channel = FakeChannel::new("telegram", false);
        let dispatcher = Dispatcher::new(&config(vec![AlertLevel::Critical], 0), vec![channel.clone()]);

        let delivered = dispatcher
            .dispatch(&[event("cpu", AlertLevel::Warning), event("memory", AlertLevel::Critical)])
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(channel.sent.lock()[0].alert_type, "memory");
        assert!(dispatcher.last_sent("cpu").is_none());
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let channel = FakeChannel::new("telegram", false);
        let dispatcher = Dispatcher::new(&config(vec![], 5), vec![channel.clone()]);
        let t0 = Utc::now();

        dispatcher.dispatch_at(&[event("cpu", AlertLevel::Critical)], t0).await.unwrap();
        dispatcher
            .dispatch_at(&[event("cpu", AlertLevel::Critical)], t0 + ChronoDuration::minutes(4))
            .await
            .unwrap();
        assert_eq!(channel.sent(), 1);

        // other types are unaffected
        dispatcher
            .dispatch_at(&[event("memory", AlertLevel::Critical)], t0 + ChronoDuration::minutes(4))
            .await
            .unwrap();
        assert_eq!(channel.sent(), 2);

        dispatcher
            .dispatch_at(&[event("cpu", AlertLevel::Critical)], t0 + ChronoDuration::minutes(5))
            .await
            .unwrap();
        assert_eq!(channel.sent(), 3);
    }

    #[tokio::test]
    async fn test_cooldown_recorded_even_when_all_channels_fail() {
        let bad = FakeChannel::new("email", true);
        let dispatcher = Dispatcher::new(&config(vec![], 10), vec![bad.clone()]);
        let t0 = Utc::now();

        assert!(dispatcher.dispatch_at(&[event("cpu", AlertLevel::Critical)], t0).await.is_err());
        let retry = dispatcher
            .dispatch_at(&[event("cpu", AlertLevel::Critical)], t0 + ChronoDuration::minutes(1))
            .await;
        assert_eq!(retry.unwrap(), 0);
        assert_eq!(bad.sent(), 1);
    }

    #[tokio::test]
    async fn test_zero_cooldown_sends_every_time() {
        let channel = FakeChannel::new("telegram", false);
        let dispatcher = Dispatcher::new(&config(vec![], 0), vec![channel.clone()]);
        let batch = [event("cpu", AlertLevel::Critical), event("cpu", AlertLevel::Warning)];
        assert_eq!(dispatcher.dispatch(&batch).await.unwrap(), 2);
        assert_eq!(channel.sent(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_respects_cooldown() {
        let channel = FakeChannel::new("telegram", false);
        let dispatcher = Arc::new(Dispatcher::new(&config(vec![], 5), vec![channel.clone()]));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(&[event("cpu", AlertLevel::Critical)]).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(channel.sent(), 1);
    }

    #[test]
    fn test_notification_formatting() {
        let alert = AlertEvent::new("disk_/", "Disk usage on / is 95.0% (threshold: 90.0%)", AlertLevel::Critical, Utc::now());
        assert_eq!(subject("Monic", &alert), "[Monic Alert] CRITICAL - disk_/");

        let body = plain_body("Monic", &alert, Utc::now());
        assert!(body.starts_with("MONIC MONITORING ALERT\n"));
        assert!(body.contains("Alert Level: CRITICAL\n"));
        assert!(body.contains("Message: Disk usage on / is 95.0%"));

        let html = html_message("Monic", &AlertEvent::new("http_a<b>", "x & y", AlertLevel::Warning, Utc::now()));
        assert!(html.starts_with("<b>[Monic Alert] WARNING - http_a&lt;b&gt;</b>"));
        assert!(html.contains("Message: x &amp; y"));
    }
}
