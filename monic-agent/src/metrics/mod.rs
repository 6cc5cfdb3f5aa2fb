//! System metrics collection
//!
//! Provides cross-platform resource sampling through sysinfo:
//! - CPU usage over a short measurement window
//! - Memory usage statistics
//! - Disk usage for the configured paths, resolved to their mount point

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use monic_core::{DiskUsage, MemoryUsage, MonitorError, ResourceCollector, ResourceSample, Result};
use parking_lot::Mutex;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, warn};

/// One mounted filesystem as reported by the OS.
#[derive(Debug, Clone)]
struct Mount {
    mount_point: PathBuf,
    total_bytes: u64,
    available_bytes: u64,
}

/// Resource collector backed by a long-lived `sysinfo::System`.
pub struct SysinfoCollector {
    system: Mutex<System>,
}

impl SysinfoCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    fn mounts() -> Vec<Mount> {
        Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| Mount {
                mount_point: disk.mount_point().to_path_buf(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
            .collect()
    }
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceCollector for SysinfoCollector {
    async fn collect(&self, disk_paths: &[String]) -> Result<ResourceSample> {
        debug!("Collecting system metrics...");

        // CPU usage is a delta between two refreshes
        self.system.lock().refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;

        let (cpu_percent, total, available) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            (
                system.global_cpu_info().cpu_usage() as f64,
                system.total_memory(),
                system.available_memory(),
            )
        };

        let memory = memory_usage(total, available)?;

        let mounts = Self::mounts();
        let mut disks = Vec::with_capacity(disk_paths.len());
        for path in disk_paths {
            match disk_usage(&mounts, path) {
                Some(usage) => disks.push(usage),
                None => warn!("Failed to get disk usage for {}: no matching filesystem", path),
            }
        }

        Ok(ResourceSample {
            timestamp: Utc::now(),
            cpu_percent,
            memory,
            disks,
        })
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

fn memory_usage(total_bytes: u64, available_bytes: u64) -> Result<MemoryUsage> {
    if total_bytes == 0 {
        return Err(MonitorError::Collection("failed to get memory usage: total memory is zero".into()));
    }
    let used_bytes = total_bytes.saturating_sub(available_bytes);
    Ok(MemoryUsage {
        total_bytes,
        used_bytes,
        free_bytes: available_bytes,
        used_percent: percent(used_bytes, total_bytes),
    })
}

/// Usage of the filesystem holding `path`: the mount with the longest
/// mount point that is a prefix of it.
fn disk_usage(mounts: &[Mount], path: &str) -> Option<DiskUsage> {
    let target = Path::new(path);
    let mount = mounts
        .iter()
        .filter(|m| target.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.components().count())?;

    let used_bytes = mount.total_bytes.saturating_sub(mount.available_bytes);
    Some(DiskUsage {
        path: path.to_string(),
        total_bytes: mount.total_bytes,
        used_bytes,
        free_bytes: mount.available_bytes,
        used_percent: percent(used_bytes, mount.total_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(point: &str, total: u64, available: u64) -> Mount {
        Mount {
            mount_point: PathBuf::from(point),
            total_bytes: total,
            available_bytes: available,
        }
    }

    #[test]
    fn test_disk_usage_picks_deepest_mount() {
        let mounts = vec![mount("/", 1000, 600), mount("/data", 200, 10)];

        let root = disk_usage(&mounts, "/").unwrap();
        assert_eq!(root.used_bytes, 400);
        assert_eq!(root.used_percent, 40.0);

        let data = disk_usage(&mounts, "/data/db").unwrap();
        assert_eq!(data.path, "/data/db");
        assert_eq!(data.used_percent, 95.0);

        // "/database" is not under "/data"
        let other = disk_usage(&mounts, "/database").unwrap();
        assert_eq!(other.total_bytes, 1000);
    }

    #[test]
    fn test_disk_usage_without_mounts() {
        assert!(disk_usage(&[], "/").is_none());
    }

    #[test]
    fn test_memory_usage() {
        let memory = memory_usage(8_000, 2_000).unwrap();
        assert_eq!(memory.used_bytes, 6_000);
        assert_eq!(memory.used_percent, 75.0);
        assert!(memory_usage(0, 0).is_err());
    }

    #[tokio::test]
    async fn test_collect_live_metrics() {
        let collector = SysinfoCollector::new();
        let sample = collector.collect(&["/".to_string()]).await.unwrap();
        assert!(sample.cpu_percent.is_finite());
        assert!(sample.memory.total_bytes > 0);
        assert!((0.0..=100.0).contains(&sample.memory.used_percent));
    }
}
