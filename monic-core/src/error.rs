//! Engine error types.

use thiserror::Error;

/// One channel that failed to deliver one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel: String,
    pub alert_type: String,
    pub message: String,
}

impl std::fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.channel, self.alert_type, self.message)
    }
}

/// Errors raised by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Resource metrics could not be collected.
    #[error("Failed to collect metrics: {0}")]
    Collection(String),

    /// An endpoint probe could not be built or executed.
    #[error("Endpoint probe failed: {0}")]
    Probe(String),

    /// The container runtime could not be queried.
    #[error("Failed to list containers: {0}")]
    Containers(String),

    /// A single notification channel failed. The channel name is carried
    /// separately so aggregated failures do not repeat it.
    #[error("{message}")]
    Channel { channel: String, message: String },

    /// Aggregated failures of one dispatch pass.
    #[error("failed to send alerts: {}", join_failures(.0))]
    Dispatch(Vec<ChannelFailure>),

    /// Invalid configuration, fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A channel is enabled but lacks its credentials.
    #[error("Alert channel not configured: {0}")]
    ChannelNotConfigured(String),
}

impl MonitorError {
    /// Shorthand for a channel transport failure.
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        MonitorError::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Failures carried by a [`MonitorError::Dispatch`], empty otherwise.
    pub fn failures(&self) -> &[ChannelFailure] {
        match self {
            MonitorError::Dispatch(failures) => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_lists_every_failure() {
        let err = MonitorError::Dispatch(vec![
            ChannelFailure {
                channel: "email".into(),
                alert_type: "cpu".into(),
                message: "SMTP auth failed".into(),
            },
            ChannelFailure {
                channel: "telegram".into(),
                alert_type: "cpu".into(),
                message: "status 401".into(),
            },
        ]);

        let text = err.to_string();
        assert_eq!(
            text,
            "failed to send alerts: email[cpu]: SMTP auth failed; telegram[cpu]: status 401"
        );
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_failures_empty_for_other_variants() {
        let err = MonitorError::Collection("boom".into());
        assert!(err.failures().is_empty());
        assert_eq!(err.to_string(), "Failed to collect metrics: boom");
    }
}
