//! Bounded in-memory history for reporting.
//!
//! Four independent rolling windows (alerts, resource samples, endpoint
//! results, container samples), each behind its own reader/writer lock so a
//! slow reader of one category never stalls a writer of another. Reads
//! always return owned copies.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::models::{AlertEvent, ContainerSample, EndpointResult, ResourceSample};

pub const DEFAULT_CAPACITY: usize = 100;

/// Capacity-bounded FIFO window.
#[derive(Debug)]
pub struct Bounded<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> Bounded<T> {
    /// A zero capacity falls back to [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    pub fn append(&self, entry: T) {
        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Appends a batch under one write lock, then trims to capacity.
    pub fn extend<I: IntoIterator<Item = T>>(&self, batch: I) {
        let mut entries = self.entries.write();
        entries.extend(batch);
        let excess = entries.len().saturating_sub(self.capacity);
        entries.drain(..excess);
    }

    pub fn all(&self) -> Vec<T> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.entries.read().back().cloned()
    }

    /// Most recent entry matching `pred`.
    pub fn find_latest<F: Fn(&T) -> bool>(&self, pred: F) -> Option<T> {
        self.entries.read().iter().rev().find(|e| pred(e)).cloned()
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// History category selector for the untyped operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Alerts,
    Resources,
    Endpoints,
    Containers,
}

/// Counts snapshot exposed on the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStatus {
    pub alerts_count: usize,
    pub resources_count: usize,
    pub endpoints_count: usize,
    pub containers_count: usize,
    pub max_history_size: usize,
    pub timestamp: DateTime<Utc>,
}

/// The four rolling windows.
#[derive(Debug)]
pub struct HistoryStore {
    alerts: Bounded<AlertEvent>,
    resources: Bounded<ResourceSample>,
    endpoints: Bounded<EndpointResult>,
    containers: Bounded<ContainerSample>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Bounded::new(capacity),
            resources: Bounded::new(capacity),
            endpoints: Bounded::new(capacity),
            containers: Bounded::new(capacity),
        }
    }

    pub fn alerts(&self) -> &Bounded<AlertEvent> {
        &self.alerts
    }

    pub fn resources(&self) -> &Bounded<ResourceSample> {
        &self.resources
    }

    pub fn endpoints(&self) -> &Bounded<EndpointResult> {
        &self.endpoints
    }

    pub fn containers(&self) -> &Bounded<ContainerSample> {
        &self.containers
    }

    /// Latest result recorded for the endpoint called `name`.
    pub fn latest_endpoint(&self, name: &str) -> Option<EndpointResult> {
        self.endpoints.find_latest(|r| r.name == name)
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::Alerts => self.alerts.count(),
            Category::Resources => self.resources.count(),
            Category::Endpoints => self.endpoints.count(),
            Category::Containers => self.containers.count(),
        }
    }

    pub fn clear(&self, category: Category) {
        match category {
            Category::Alerts => self.alerts.clear(),
            Category::Resources => self.resources.clear(),
            Category::Endpoints => self.endpoints.clear(),
            Category::Containers => self.containers.clear(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.alerts.capacity()
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            alerts_count: self.alerts.count(),
            resources_count: self.resources.count(),
            endpoints_count: self.endpoints.count(),
            containers_count: self.containers.count(),
            max_history_size: self.capacity(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
