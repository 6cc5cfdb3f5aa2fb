//! Container status through the docker CLI
//!
//! Runs `docker ps -a` for the container list, then `docker inspect` per
//! container for restart count, exit code and runtime error. Every command
//! runs with a timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use monic_core::{ContainerLister, ContainerSample, MonitorError, Result};
use serde::Deserialize;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Debug, Default, Deserialize)]
struct InspectEntry {
    #[serde(rename = "RestartCount", default)]
    restart_count: u32,
    #[serde(rename = "State", default)]
    state: InspectState,
}

#[derive(Debug, Default, Deserialize)]
struct InspectState {
    #[serde(rename = "ExitCode", default)]
    exit_code: i64,
    #[serde(rename = "Error", default)]
    error: String,
}

/// Details merged into a sample from `docker inspect`.
#[derive(Debug, Default, PartialEq)]
struct ContainerDetails {
    restart_count: u32,
    exit_code: i64,
    error: Option<String>,
}

pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Executing {} {}", self.binary, args.join(" "));
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            AsyncCommand::new(&self.binary)
                .args(args)
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| MonitorError::Containers(format!("{} {} timed out", self.binary, args[0])))?
        .map_err(|e| MonitorError::Containers(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(MonitorError::Containers(format!(
                "{} {} failed: {}",
                self.binary,
                args[0],
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn details(&self, container_id: &str) -> Result<ContainerDetails> {
        let output = self.run(&["inspect", container_id]).await?;
        parse_inspect(&output)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerLister for DockerCli {
    async fn initialize(&self) -> Result<()> {
        self.run(&["version", "--format", "{{.Server.Version}}"])
            .await
            .map_err(|e| {
                MonitorError::Containers(format!("Docker CLI not available or Docker daemon not running: {}", e))
            })?;
        info!("Docker monitor initialized successfully");
        Ok(())
    }

    async fn list(&self, names: &[String]) -> Result<Vec<ContainerSample>> {
        let output = self.run(&["ps", "-a", "--format", "{{json .}}"]).await?;

        let mut samples = Vec::new();
        for entry in parse_ps(&output) {
            if !wanted(&entry.names, names) {
                continue;
            }
            let details = match self.details(&entry.id).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(container = %entry.names, "Failed to inspect container: {}", e);
                    ContainerDetails::default()
                }
            };
            samples.push(ContainerSample {
                running: entry.state.contains("running"),
                container_id: entry.id,
                name: entry.names,
                status: entry.status,
                state: entry.state,
                restart_count: details.restart_count,
                exit_code: details.exit_code,
                error: details.error,
                timestamp: Utc::now(),
            });
        }
        Ok(samples)
    }
}

/// Parses `docker ps` JSON lines, skipping lines that fail to parse.
fn parse_ps(output: &str) -> Vec<PsEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<PsEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to parse container JSON: {}", e);
                None
            }
        })
        .collect()
}

fn parse_inspect(output: &str) -> Result<ContainerDetails> {
    let entries: Vec<InspectEntry> = serde_json::from_str(output)
        .map_err(|e| MonitorError::Containers(format!("failed to parse container inspect JSON: {}", e)))?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| MonitorError::Containers("no container info found".into()))?;

    Ok(ContainerDetails {
        restart_count: entry.restart_count,
        exit_code: entry.state.exit_code,
        error: Some(entry.state.error).filter(|e| !e.is_empty()),
    })
}

/// Whether the container called `name` is selected by the filter; an empty
/// filter selects everything.
fn wanted(name: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|f| name == f || name.strip_prefix('/') == Some(f.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_OUTPUT: &str = r#"{"Command":"\"nginx\"","ID":"a1b2c3","Image":"nginx","Names":"web","State":"running","Status":"Up 2 hours"}
not json
{"ID":"d4e5f6","Names":"db","State":"exited","Status":"Exited (1) 5 minutes ago"}
"#;

    #[test]
    fn test_parse_ps_skips_bad_lines() {
        let entries = parse_ps(PS_OUTPUT);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a1b2c3");
        assert_eq!(entries[0].names, "web");
        assert_eq!(entries[1].state, "exited");
    }

    #[test]
    fn test_parse_inspect() {
        let output = r#"[{"Id":"d4e5f6","RestartCount":3,"State":{"Status":"exited","ExitCode":1,"Error":""}}]"#;
        let details = parse_inspect(output).unwrap();
        assert_eq!(
            details,
            ContainerDetails {
                restart_count: 3,
                exit_code: 1,
                error: None,
            }
        );

        let output = r#"[{"State":{"ExitCode":0,"Error":"OCI runtime error"}}]"#;
        assert_eq!(parse_inspect(output).unwrap().error.as_deref(), Some("OCI runtime error"));

        assert!(parse_inspect("[]").is_err());
        assert!(parse_inspect("garbage").is_err());
    }

    #[test]
    fn test_name_filter() {
        assert!(wanted("web", &[]));
        assert!(wanted("web", &["web".to_string()]));
        assert!(wanted("/web", &["web".to_string()]));
        assert!(!wanted("db", &["web".to_string()]));
    }

    #[tokio::test]
    async fn test_initialize_fails_without_cli() {
        let docker = DockerCli::with_binary("monic-test-no-such-binary");
        let err = docker.initialize().await.unwrap_err();
        assert!(err.to_string().contains("Docker CLI not available"));
        assert!(docker.list(&[]).await.is_err());
    }
}
