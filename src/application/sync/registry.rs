use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
    time::{Duration, Instant},
};

use crate::{domain::sync::SyncStatus, util::lock};

const OWNER: &str = "application::sync::registry";

/// Shared sync bookkeeping: when each prefix was last triggered and its published status.
///
/// The two tables sit behind separate locks and no method holds both at once.
#[derive(Debug, Default)]
pub struct SyncRegistry {
    last_triggered: Mutex<HashMap<String, Instant>>,
    statuses: RwLock<HashMap<String, SyncStatus>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger for `prefix` when at least `interval` has passed since the last one.
    ///
    /// Returns `false` when the cycle is not yet due. A zero interval always passes.
    pub fn try_begin(&self, prefix: &str, interval: Duration) -> bool {
        self.try_begin_at(prefix, interval, Instant::now())
    }

    fn try_begin_at(&self, prefix: &str, interval: Duration, now: Instant) -> bool {
        let mut triggered = lock::lock(&self.last_triggered, OWNER);
        let due = match triggered.get(prefix) {
            Some(last) => interval.is_zero() || now.saturating_duration_since(*last) >= interval,
            None => true,
        };
        if !due {
            return false;
        }
        triggered.insert(prefix.to_string(), now);
        true
    }

    /// Record a trigger for `prefix` without running a cycle.
    pub fn mark_triggered(&self, prefix: &str) {
        lock::lock(&self.last_triggered, OWNER).insert(prefix.to_string(), Instant::now());
    }

    pub fn update_status<F>(&self, prefix: &str, update: F)
    where
        F: FnOnce(&mut SyncStatus),
    {
        let mut statuses = lock::write(&self.statuses, OWNER);
        update(statuses.entry(prefix.to_string()).or_default());
    }

    /// Snapshot of the status for `prefix`; `unknown` when no cycle has started yet.
    pub fn status(&self, prefix: &str) -> SyncStatus {
        lock::read(&self.statuses, OWNER)
            .get(prefix)
            .cloned()
            .unwrap_or_else(SyncStatus::unknown)
    }
}
