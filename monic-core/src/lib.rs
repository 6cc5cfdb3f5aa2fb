//! Monic Core - monitoring and alerting engine
//!
//! Samples flow from collaborators through the classification policy and the
//! per-key alert state machine into a bounded history and a pending alert
//! queue; the dispatcher drains the queue on its own timer:
//! - `history`: capacity-bounded rolling windows, one lock per category
//! - `state_machine`: debounce (3 consecutive samples) and recovery notices
//! - `dispatcher`: level filter, per-type cooldown, channel fan-out
//! - `scheduler`: periodic tasks and graceful shutdown

pub mod classify;
pub mod collectors;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod state_machine;

pub use collectors::{AlertChannel, ContainerLister, EndpointProber, ResourceCollector};
pub use config::MonitorConfig;
pub use dispatcher::Dispatcher;
pub use error::{ChannelFailure, MonitorError, Result};
pub use history::{Category, HistoryStore};
pub use models::{AlertEvent, AlertLevel, ContainerSample, DiskUsage, EndpointResult, MemoryUsage, ResourceSample};
pub use queue::AlertQueue;
pub use scheduler::{Collaborators, Monitor, MonitorHandle, ServiceStatus};
pub use state_machine::{AlertState, AlertStateMachine, HealthState};
