//! Host identification reported at startup and on the stats endpoint.

use serde::Serialize;
use sysinfo::System;
use tracing::info;

/// Static facts about the monitored host
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub os_version: Option<String>,
    pub architecture: String,
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub agent_version: String,
}

impl HostInfo {
    pub fn discover() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let host = HostInfo {
            hostname,
            os: std::env::consts::OS.to_string(),
            os_version: System::long_os_version(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_count: sys.cpus().len(),
            total_memory_bytes: sys.total_memory(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        info!(
            "Discovery complete - Hostname: {}, OS: {}, Arch: {}, CPUs: {}",
            host.hostname, host.os, host.architecture, host.cpu_count
        );
        host
    }
}
