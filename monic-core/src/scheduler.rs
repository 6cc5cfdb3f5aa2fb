//! Orchestration of the periodic monitoring tasks.
//!
//! [`Monitor`] owns the shared engine state and one cycle function per
//! domain. [`Monitor::start`] spawns a ticking task per domain plus the
//! dispatch task; [`MonitorHandle::shutdown`] broadcasts the stop signal and
//! waits for every task to leave its loop. A cycle in progress always runs
//! to completion before its task notices the signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::classify::{
    evaluate_containers, evaluate_endpoints, evaluate_resources, summarize_containers, summarize_endpoints,
};
use crate::collectors::{AlertChannel, ContainerLister, EndpointProber, ResourceCollector};
use crate::config::MonitorConfig;
use crate::dispatcher::Dispatcher;
use crate::history::{HistoryStatus, HistoryStore};
use crate::queue::AlertQueue;
use crate::state_machine::AlertStateMachine;

/// External collaborators handed to the engine.
pub struct Collaborators {
    pub resources: Arc<dyn ResourceCollector>,
    pub prober: Arc<dyn EndpointProber>,
    pub containers: Option<Arc<dyn ContainerLister>>,
    pub channels: Vec<Arc<dyn AlertChannel>>,
}

/// Service status for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub app_name: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub history: HistoryStatus,
    pub pending_alerts: usize,
    pub tracked_states: usize,
    pub channels: Vec<String>,
}

pub struct Monitor {
    config: MonitorConfig,
    history: HistoryStore,
    states: AlertStateMachine,
    queue: AlertQueue,
    dispatcher: Dispatcher,
    resources: Arc<dyn ResourceCollector>,
    prober: Arc<dyn EndpointProber>,
    containers: Option<Arc<dyn ContainerLister>>,
    started_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, collaborators: Collaborators) -> Self {
        let dispatcher = Dispatcher::new(&config.alerting, collaborators.channels);
        Self {
            history: HistoryStore::new(config.history_capacity),
            states: AlertStateMachine::new(),
            queue: AlertQueue::new(),
            dispatcher,
            resources: collaborators.resources,
            prober: collaborators.prober,
            containers: collaborators.containers,
            started_at: Utc::now(),
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn states(&self) -> &AlertStateMachine {
        &self.states
    }

    pub fn queue(&self) -> &AlertQueue {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> ServiceStatus {
        let now = Utc::now();
        ServiceStatus {
            app_name: self.config.app_name.clone(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
            history: self.history.status(),
            pending_alerts: self.queue.len(),
            tracked_states: self.states.len(),
            channels: self.dispatcher.channel_names(),
        }
    }

    /// One resource cycle. Returns the number of events queued.
    pub async fn run_resource_cycle(&self) -> usize {
        let checks = &self.config.resources;
        let sample = match self.resources.collect(&checks.disk_paths).await {
            Ok(sample) => sample,
            Err(e) => {
                error!("Error collecting system stats: {}", e);
                return 0;
            }
        };

        self.history.resources().append(sample.clone());

        let events = evaluate_resources(&self.states, &sample, checks);
        let queued = events.len();
        if queued > 0 {
            info!(count = queued, "System alerts generated");
            self.queue.push_all(events);
        }

        info!(
            cpu = %format!("{:.2}%", sample.cpu_percent),
            memory = %format!("{:.2}%", sample.memory.used_percent),
            disk = %sample.disk_summary(),
            "System stats"
        );
        queued
    }

    /// One endpoint cycle. Probes run concurrently up to the configured
    /// bound; results keep configuration order.
    pub async fn run_endpoint_cycle(&self) -> usize {
        let endpoints = &self.config.endpoints;
        if endpoints.checks.is_empty() {
            return 0;
        }

        let probes: Vec<_> = endpoints
            .checks
            .iter()
            .cloned()
            .map(|check| {
                let prober = Arc::clone(&self.prober);
                async move {
                    let outcome = prober.probe(&check).await;
                    (check, outcome)
                }
            })
            .collect();
        let outcomes: Vec<_> = stream::iter(probes)
            .buffered(endpoints.max_concurrent_probes.max(1))
            .collect()
            .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (check, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => warn!(endpoint = %check.name, "Skipping endpoint probe: {}", e),
            }
        }
        if results.is_empty() {
            return 0;
        }

        self.history.endpoints().extend(results.iter().cloned());

        let events = evaluate_endpoints(&self.states, &results);
        let queued = events.len();
        if queued > 0 {
            info!(count = queued, "HTTP alerts generated");
            self.queue.push_all(events);
        }

        let summary = summarize_endpoints(&results);
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            rate = %format!("{:.1}%", summary.success_rate),
            "HTTP stats"
        );
        queued
    }

    pub async fn run_container_cycle(&self) -> usize {
        let Some(lister) = &self.containers else {
            return 0;
        };

        let samples = match lister.list(&self.config.containers.names).await {
            Ok(samples) => samples,
            Err(e) => {
                error!("Error collecting Docker stats: {}", e);
                return 0;
            }
        };

        self.history.containers().extend(samples.iter().cloned());

        let events = evaluate_containers(&self.states, &samples);
        let queued = events.len();
        if queued > 0 {
            info!(count = queued, "Docker alerts generated");
            self.queue.push_all(events);
        }

        let summary = summarize_containers(&samples);
        info!(
            total = summary.total,
            running = summary.running,
            stopped = summary.stopped,
            percentage = %format!("{:.1}%", summary.running_rate),
            "Docker stats"
        );
        queued
    }

    /// Drains the pending queue, records the events and dispatches them.
    /// Returns the number of events drained.
    pub async fn run_dispatch_cycle(&self) -> usize {
        let events = self.queue.drain();
        if events.is_empty() {
            return 0;
        }

        for event in &events {
            info!(level = %event.level, alert_type = %event.alert_type, message = %event.message, "ALERT");
        }
        self.history.alerts().extend(events.iter().cloned());

        if let Err(e) = self.dispatcher.dispatch(&events).await {
            error!("Failed to send some alerts: {}", e);
        }
        events.len()
    }

    /// Spawns the periodic tasks. The container task is only started when
    /// container checks are enabled and the runtime initializes.
    pub async fn start(self: Arc<Self>) -> MonitorHandle {
        let (shutdown_tx, _) = watch::channel(false);
        let mut tasks = Vec::new();

        let resources = Duration::from_secs(self.config.resources.interval_secs);
        let monitor = self.clone();
        tasks.push((
            "resources",
            spawn_periodic("resources", resources, shutdown_tx.subscribe(), move || {
                let monitor = monitor.clone();
                async move {
                    monitor.run_resource_cycle().await;
                }
            }),
        ));

        let endpoints = Duration::from_secs(self.config.endpoints.interval_secs);
        let monitor = self.clone();
        tasks.push((
            "endpoints",
            spawn_periodic("endpoints", endpoints, shutdown_tx.subscribe(), move || {
                let monitor = monitor.clone();
                async move {
                    monitor.run_endpoint_cycle().await;
                }
            }),
        ));

        if self.container_checks_ready().await {
            let containers = Duration::from_secs(self.config.containers.interval_secs);
            let monitor = self.clone();
            tasks.push((
                "containers",
                spawn_periodic("containers", containers, shutdown_tx.subscribe(), move || {
                    let monitor = monitor.clone();
                    async move {
                        monitor.run_container_cycle().await;
                    }
                }),
            ));
        }

        let dispatch = Duration::from_secs(self.config.alerting.dispatch_interval_secs);
        let monitor = self.clone();
        tasks.push((
            "dispatch",
            spawn_periodic("dispatch", dispatch, shutdown_tx.subscribe(), move || {
                let monitor = monitor.clone();
                async move {
                    monitor.run_dispatch_cycle().await;
                }
            }),
        ));

        info!(
            tasks = ?tasks.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            "Monitoring service started"
        );

        MonitorHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }

    async fn container_checks_ready(&self) -> bool {
        if !self.config.containers.enabled {
            return false;
        }
        let Some(lister) = &self.containers else {
            warn!("Container checks enabled but no container runtime configured");
            return false;
        };
        match lister.initialize().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Container runtime unavailable, container checks disabled: {}", e);
                false
            }
        }
    }
}

/// Runs `cycle` every `period` until the shutdown signal flips. The first
/// cycle runs one period after start.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(task = name, "Monitoring task stopped");
    })
}

/// Handle to the running tasks.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl MonitorHandle {
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signals every task and waits until all of them have exited.
    pub async fn shutdown(self) {
        info!("Stopping monitoring service");
        // Send fails only when every receiver is gone, i.e. the tasks already exited.
        let _ = self.shutdown.send(true);
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(task = name, "Monitoring task ended abnormally: {}", e);
            }
        }
        info!("All monitoring tasks stopped");
    }
}
