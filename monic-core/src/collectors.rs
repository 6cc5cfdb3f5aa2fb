//! Collaborator seams. The engine only talks to the outside world through
//! these traits; concrete implementations live in the agent binary and
//! scripted ones in the devkit.

use async_trait::async_trait;

use crate::config::EndpointCheck;
use crate::error::Result;
use crate::models::{AlertEvent, ContainerSample, EndpointResult, ResourceSample};

/// Reads CPU, memory and disk usage for the configured paths.
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    async fn collect(&self, disk_paths: &[String]) -> Result<ResourceSample>;
}

/// Executes one endpoint probe.
///
/// Probe failures (bad status, timeout, refused connection) are reported
/// inside the returned [`EndpointResult`]; an `Err` means the probe could not
/// be attempted at all and skips the endpoint for this cycle.
#[async_trait]
pub trait EndpointProber: Send + Sync {
    async fn probe(&self, check: &EndpointCheck) -> Result<EndpointResult>;
}

/// Queries the container runtime.
#[async_trait]
pub trait ContainerLister: Send + Sync {
    /// Checks the runtime is reachable. Container checks are not started
    /// when this fails.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Status of the named containers, or of every container when `names`
    /// is empty.
    async fn list(&self, names: &[String]) -> Result<Vec<ContainerSample>>;
}

/// A notification transport.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name used in logs and aggregated errors.
    fn name(&self) -> &str;

    async fn send(&self, alert: &AlertEvent) -> Result<()>;
}
