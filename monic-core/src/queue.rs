//! Pending alert queue between the producer tasks and the dispatch task.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::AlertEvent;

/// Unbounded FIFO of events awaiting dispatch.
#[derive(Debug, Default)]
pub struct AlertQueue {
    pending: Mutex<VecDeque<AlertEvent>>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: AlertEvent) {
        self.pending.lock().push_back(event);
    }

    pub fn push_all<I: IntoIterator<Item = AlertEvent>>(&self, events: I) {
        self.pending.lock().extend(events);
    }

    /// Takes every queued event, oldest first, leaving the queue empty.
    pub fn drain(&self) -> Vec<AlertEvent> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
