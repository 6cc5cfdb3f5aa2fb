//! Domain classification: turns samples into keyed health states and feeds
//! them through the [`AlertStateMachine`].
//!
//! Thresholds are inclusive: a reading equal to its threshold is critical.

use tracing::warn;

use crate::config::ResourceChecks;
use crate::models::{AlertEvent, ContainerSample, EndpointResult, ResourceSample};
use crate::state_machine::{AlertStateMachine, HealthState};

/// Exit code docker reports for a SIGKILLed container; not treated as a crash.
const SIGKILL_EXIT_CODE: i64 = 137;

pub fn disk_key(path: &str) -> String {
    format!("disk_{}", path)
}

pub fn endpoint_key(name: &str) -> String {
    format!("http_{}", name)
}

pub fn container_key(name: &str) -> String {
    format!("docker_{}", name)
}

/// Classifies one percentage reading against its threshold.
pub fn classify_threshold(value: f64, threshold: f64) -> HealthState {
    HealthState::from_failure(value >= threshold)
}

fn threshold_message(label: &str, state: HealthState, value: f64, threshold: f64) -> String {
    match state {
        HealthState::Critical => format!("{} is {:.1}% (threshold: {:.1}%)", label, value, threshold),
        HealthState::Ok => format!("{} recovered to {:.1}% (threshold: {:.1}%)", label, value, threshold),
    }
}

fn evaluate_threshold(
    machine: &AlertStateMachine,
    sample: &ResourceSample,
    key: &str,
    label: &str,
    value: f64,
    threshold: f64,
) -> Option<AlertEvent> {
    if !value.is_finite() {
        warn!(key, value, "Skipping non-finite reading");
        return None;
    }
    let state = classify_threshold(value, threshold);
    let message = threshold_message(label, state, value, threshold);
    machine.evaluate_at(key, state, &message, sample.timestamp)
}

/// Evaluates CPU, memory and every disk in the sample.
pub fn evaluate_resources(
    machine: &AlertStateMachine,
    sample: &ResourceSample,
    checks: &ResourceChecks,
) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    events.extend(evaluate_threshold(
        machine,
        sample,
        "cpu",
        "CPU usage",
        sample.cpu_percent,
        checks.cpu_threshold,
    ));
    events.extend(evaluate_threshold(
        machine,
        sample,
        "memory",
        "Memory usage",
        sample.memory.used_percent,
        checks.memory_threshold,
    ));
    for disk in &sample.disks {
        let label = format!("Disk usage on {}", disk.path);
        events.extend(evaluate_threshold(
            machine,
            sample,
            &disk_key(&disk.path),
            &label,
            disk.used_percent,
            checks.disk_threshold,
        ));
    }

    events
}

pub fn evaluate_endpoints(machine: &AlertStateMachine, results: &[EndpointResult]) -> Vec<AlertEvent> {
    results
        .iter()
        .filter_map(|result| {
            let state = HealthState::from_failure(!result.success);
            let message = match state {
                HealthState::Critical => result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} is unreachable", result.name)),
                HealthState::Ok => match result.status_code {
                    Some(code) => format!("{} is reachable again (status {})", result.name, code),
                    None => format!("{} is reachable again", result.name),
                },
            };
            machine.evaluate_at(&endpoint_key(&result.name), state, &message, result.timestamp)
        })
        .collect()
}

/// Problem description for an unhealthy container, `None` when healthy.
pub fn container_problem(sample: &ContainerSample) -> Option<String> {
    if !sample.running {
        return Some(format!("Container {} ({}) is stopped", sample.name, sample.container_id));
    }
    if sample.exit_code != 0 && sample.exit_code != SIGKILL_EXIT_CODE {
        return Some(format!(
            "Container {} ({}) exited with error code: {}",
            sample.name, sample.container_id, sample.exit_code
        ));
    }
    if let Some(error) = sample.error.as_deref().filter(|e| !e.is_empty()) {
        return Some(format!(
            "Container {} ({}) has error: {}",
            sample.name, sample.container_id, error
        ));
    }
    None
}

pub fn evaluate_containers(machine: &AlertStateMachine, samples: &[ContainerSample]) -> Vec<AlertEvent> {
    samples
        .iter()
        .filter_map(|sample| {
            let problem = container_problem(sample);
            let state = HealthState::from_failure(problem.is_some());
            let message = problem.unwrap_or_else(|| format!("Container {} is running again", sample.name));
            machine.evaluate_at(&container_key(&sample.name), state, &message, sample.timestamp)
        })
        .collect()
}

/// Totals for one endpoint cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub success_rate: f64,
}

pub fn summarize_endpoints(results: &[EndpointResult]) -> EndpointSummary {
    let total = results.len();
    let success = results.iter().filter(|r| r.success).count();
    EndpointSummary {
        total,
        success,
        failed: total - success,
        success_rate: percentage(success, total),
    }
}

/// Totals for one container cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSummary {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    pub running_rate: f64,
}

pub fn summarize_containers(samples: &[ContainerSample]) -> ContainerSummary {
    let total = samples.len();
    let running = samples.iter().filter(|s| s.running).count();
    ContainerSummary {
        total,
        running,
        stopped: total - running,
        running_rate: percentage(running, total),
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
