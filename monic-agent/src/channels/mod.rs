//! Notification channels: SMTP mail, Mailgun and Telegram.
//!
//! Every channel validates its settings when built so a bad address or
//! relay fails at startup, not on the first alert.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use monic_core::config::{AlertingConfig, EmailConfig, MailgunConfig, TelegramConfig};
use monic_core::dispatcher::{html_message, plain_body, subject};
use monic_core::{AlertChannel, AlertEvent, MonitorError, Result};
use reqwest::Client;
use serde_json::json;
use tracing::info;

/// Builds a channel for every configured transport. Nothing is built while
/// alerting is disabled.
pub fn build_channels(config: &AlertingConfig, app_name: &str) -> Result<Vec<Arc<dyn AlertChannel>>> {
    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
    if !config.enabled {
        info!("Alerting disabled, no channels configured");
        return Ok(channels);
    }

    if let Some(email) = &config.email {
        channels.push(Arc::new(EmailChannel::new(email, app_name)?));
    }
    if let Some(mailgun) = &config.mailgun {
        channels.push(Arc::new(MailgunChannel::new(mailgun, app_name)?));
    }
    if let Some(telegram) = &config.telegram {
        channels.push(Arc::new(TelegramChannel::new(telegram, app_name)?));
    }

    let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
    info!(channels = ?names, "Alert channels configured");
    Ok(channels)
}

fn http_client(channel: &str) -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| MonitorError::channel(channel, format!("failed to build HTTP client: {}", e)))
}

fn mailboxes(channel: &str, list: &str) -> Result<Vec<Mailbox>> {
    let parsed = list
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| {
            a.parse::<Mailbox>()
                .map_err(|e| MonitorError::ChannelNotConfigured(format!("{}: invalid address '{}': {}", channel, a, e)))
        })
        .collect::<Result<Vec<_>>>()?;
    if parsed.is_empty() {
        return Err(MonitorError::ChannelNotConfigured(format!("{}: to address is required", channel)));
    }
    Ok(parsed)
}

/// SMTP delivery, STARTTLS when `use_tls` is set.
pub struct EmailChannel {
    app_name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig, app_name: &str) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| MonitorError::ChannelNotConfigured(format!("email: invalid from address: {}", e)))?;
        let to = mailboxes("email", &config.to)?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| MonitorError::ChannelNotConfigured(format!("email: invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        let mut builder = builder.port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        Ok(Self {
            app_name: app_name.to_string(),
            from,
            to,
            transport: builder.build(),
        })
    }

    fn message(&self, alert: &AlertEvent) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(&self.app_name, alert))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(plain_body(&self.app_name, alert, Utc::now()))
            .map_err(|e| MonitorError::channel("email", format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<()> {
        let message = self.message(alert)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MonitorError::channel("email", format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

/// Mailgun messages API.
pub struct MailgunChannel {
    app_name: String,
    endpoint: String,
    api_key: String,
    from: String,
    to: String,
    client: Client,
}

impl MailgunChannel {
    pub fn new(config: &MailgunConfig, app_name: &str) -> Result<Self> {
        Ok(Self {
            app_name: app_name.to_string(),
            endpoint: format!("{}/{}/messages", config.base_url.trim_end_matches('/'), config.domain),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            to: config.to.clone(),
            client: http_client("mailgun")?,
        })
    }
}

#[async_trait]
impl AlertChannel for MailgunChannel {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<()> {
        let subject = subject(&self.app_name, alert);
        let text = plain_body(&self.app_name, alert, Utc::now());
        let form = [
            ("from", self.from.as_str()),
            ("to", self.to.as_str()),
            ("subject", subject.as_str()),
            ("text", text.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                MonitorError::channel("mailgun", format!("Mailgun API request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::channel(
                "mailgun",
                format!("Mailgun API returned status {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}

/// Telegram Bot API `sendMessage` with HTML formatting.
pub struct TelegramChannel {
    app_name: String,
    endpoint: String,
    chat_id: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, app_name: &str) -> Result<Self> {
        Ok(Self {
            app_name: app_name.to_string(),
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            client: http_client("telegram")?,
        })
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, alert: &AlertEvent) -> Result<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": html_message(&self.app_name, alert),
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                MonitorError::channel("telegram", format!("Telegram API request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::channel(
                "telegram",
                format!("Telegram API returned status {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monic_core::AlertLevel;
    use wiremock::matchers::{basic_auth, body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> AlertEvent {
        AlertEvent::new("cpu", "CPU usage is 92.0% (threshold: 80.0%)", AlertLevel::Critical, Utc::now())
    }

    fn mailgun_config(base_url: String) -> MailgunConfig {
        MailgunConfig {
            api_key: "key-123".into(),
            domain: "mg.example.com".into(),
            from: "monic@example.com".into(),
            to: "ops@example.com".into(),
            base_url,
        }
    }

    #[tokio::test]
    async fn test_mailgun_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mg.example.com/messages"))
            .and(basic_auth("api", "key-123"))
            .and(body_string_contains("subject=%5BMonic+Alert%5D+CRITICAL+-+cpu"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = MailgunChannel::new(&mailgun_config(server.uri()), "Monic").unwrap();
        channel.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_mailgun_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let channel = MailgunChannel::new(&mailgun_config(server.uri()), "Monic").unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert_eq!(err.to_string(), "Mailgun API returned status 401");
    }

    #[tokio::test]
    async fn test_telegram_sends_html_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "parse_mode": "HTML"})))
            .and(body_string_contains("<b>[Monic Alert] CRITICAL - cpu</b>"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
            api_base: server.uri(),
        };
        let channel = TelegramChannel::new(&config, "Monic").unwrap();
        channel.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_telegram_unreachable() {
        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
            api_base: "http://127.0.0.1:1".into(),
        };
        let channel = TelegramChannel::new(&config, "Monic").unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(err.to_string().starts_with("Telegram API request failed"));
    }

    #[tokio::test]
    async fn test_telegram_error_hides_bot_token() {
        let config = TelegramConfig {
            bot_token: "SECRET123:TOKEN".into(),
            chat_id: "42".into(),
            api_base: "http://127.0.0.1:1".into(),
        };
        let channel = TelegramChannel::new(&config, "Monic").unwrap();
        let err = channel.send(&alert()).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET123"), "token leaked: {}", err);
    }

    #[test]
    fn test_disabled_alerting_builds_no_channels() {
        let config = AlertingConfig {
            enabled: false,
            email: Some(EmailConfig {
                smtp_host: "smtp.example.com".into(),
                from: "not an address".into(),
                to: "ops@example.com".into(),
                ..EmailConfig::default()
            }),
            ..AlertingConfig::default()
        };
        assert!(build_channels(&config, "Monic").unwrap().is_empty());
    }

    #[test]
    fn test_email_rejects_bad_addresses() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".into(),
            from: "not an address".into(),
            to: "ops@example.com".into(),
            ..EmailConfig::default()
        };
        assert!(matches!(
            EmailChannel::new(&config, "Monic"),
            Err(MonitorError::ChannelNotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_email_message_has_every_recipient() {
        let config = EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            from: "Monic <monic@example.com>".into(),
            to: "ops@example.com, oncall@example.com".into(),
            use_tls: false,
            ..EmailConfig::default()
        };
        let channel = EmailChannel::new(&config, "Monic").unwrap();
        assert_eq!(channel.to.len(), 2);

        let message = channel.message(&alert()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [Monic Alert] CRITICAL - cpu"));
        assert!(raw.contains("oncall@example.com"));
    }

    #[test]
    fn test_build_channels_from_config() {
        let config = AlertingConfig {
            enabled: true,
            mailgun: Some(mailgun_config("https://api.mailgun.net/v3".into())),
            telegram: Some(TelegramConfig {
                bot_token: "t".into(),
                chat_id: "c".into(),
                ..TelegramConfig::default()
            }),
            ..AlertingConfig::default()
        };
        let channels = build_channels(&config, "Monic").unwrap();
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["mailgun", "telegram"]);
    }
}
