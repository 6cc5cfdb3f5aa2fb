//! Per-key alert state tracking and debounce.
//!
//! Every monitored quantity (a resource dimension, a disk path, an endpoint,
//! a container) owns one [`AlertState`]. Classified samples flow through
//! [`AlertStateMachine::evaluate`], which emits at most one critical event per
//! unhealthy episode, only once the episode has lasted
//! [`CONSECUTIVE_CHECKS_TO_ALERT`] samples, and exactly one recovery notice
//! when an episode that alerted ends.
//!
//! The key map is written by several scheduler tasks at once, so it lives
//! behind a mutex; the lock is never held across an await point.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::models::{AlertEvent, AlertLevel};

/// Consecutive unhealthy samples required before a critical alert fires.
pub const CONSECUTIVE_CHECKS_TO_ALERT: u32 = 3;

/// Binary classification of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Critical,
}

impl HealthState {
    pub fn from_failure(failed: bool) -> Self {
        if failed {
            HealthState::Critical
        } else {
            HealthState::Ok
        }
    }
}

/// Debounce record for one alert key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertState {
    pub key: String,
    pub current_state: HealthState,
    pub consecutive_checks: u32,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
    /// Whether a critical alert already went out for the current episode.
    pub episode_alerted: bool,
}

impl AlertState {
    fn new(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            current_state: HealthState::Ok,
            consecutive_checks: 0,
            last_alert_sent: None,
            last_state_change: now,
            episode_alerted: false,
        }
    }
}

/// Shared key -> state map plus the debounce policy.
#[derive(Debug)]
pub struct AlertStateMachine {
    states: Mutex<HashMap<String, AlertState>>,
    checks_to_alert: u32,
}

impl AlertStateMachine {
    pub fn new() -> Self {
        Self::with_checks_to_alert(CONSECUTIVE_CHECKS_TO_ALERT)
    }

    pub fn with_checks_to_alert(checks_to_alert: u32) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            checks_to_alert: checks_to_alert.max(1),
        }
    }

    /// Feeds one classified sample for `key`, returning the event to queue, if any.
    pub fn evaluate(&self, key: &str, classified: HealthState, message: &str) -> Option<AlertEvent> {
        self.evaluate_at(key, classified, message, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        key: &str,
        classified: HealthState,
        message: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let mut states = self.states.lock();
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| AlertState::new(key, now));

        let mut recovered_from_alert = false;
        if state.current_state != classified {
            recovered_from_alert = classified == HealthState::Ok && state.episode_alerted;
            state.current_state = classified;
            state.consecutive_checks = 1;
            state.last_state_change = now;
            state.episode_alerted = false;
        } else {
            state.consecutive_checks = state.consecutive_checks.saturating_add(1);
        }

        let level = match classified {
            HealthState::Critical
                if state.consecutive_checks >= self.checks_to_alert && !state.episode_alerted =>
            {
                state.episode_alerted = true;
                AlertLevel::Critical
            }
            HealthState::Ok if recovered_from_alert => AlertLevel::Warning,
            _ => return None,
        };

        state.last_alert_sent = Some(now);
        Some(AlertEvent::new(key, message, level, now))
    }

    /// Copy of the state for `key`.
    pub fn get(&self, key: &str) -> Option<AlertState> {
        self.states.lock().get(key).cloned()
    }

    /// Copies of every tracked state, sorted by key.
    pub fn snapshot(&self) -> Vec<AlertState> {
        let mut states: Vec<AlertState> = self.states.lock().values().cloned().collect();
        states.sort_by(|a, b| a.key.cmp(&b.key));
        states
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    pub fn reset(&self, key: &str) {
        self.states.lock().remove(key);
    }

    pub fn reset_all(&self) {
        self.states.lock().clear();
    }
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
