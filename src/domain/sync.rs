//! Per-prefix sync status as published by the sync engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
    /// No cycle has run for the prefix yet.
    Unknown,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Error => "error",
            SyncState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub last_sync_time: Option<OffsetDateTime>,
    pub next_sync_time: Option<OffsetDateTime>,
    pub progress_percent: f64,
    pub total_files: u64,
    pub current_files: u64,
    pub state: SyncState,
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Placeholder returned for prefixes that have never been synced.
    pub fn unknown() -> Self {
        Self {
            last_sync_time: None,
            next_sync_time: None,
            progress_percent: 0.0,
            total_files: 0,
            current_files: 0,
            state: SyncState::Unknown,
            last_error: None,
        }
    }

    /// Enter the syncing state for a new cycle, keeping the previous `last_sync_time`.
    pub fn begin_cycle(&mut self, next_sync_time: Option<OffsetDateTime>) {
        self.state = SyncState::Syncing;
        self.progress_percent = 0.0;
        self.total_files = 0;
        self.current_files = 0;
        self.last_error = None;
        self.next_sync_time = next_sync_time;
    }

    pub fn record_progress(&mut self, current_files: u64, total_files: u64) {
        self.current_files = current_files;
        self.total_files = total_files;
        self.progress_percent = if total_files == 0 {
            0.0
        } else {
            (current_files as f64 / total_files as f64 * 100.0).min(100.0)
        };
    }

    pub fn finish_ok(&mut self, started_at: OffsetDateTime) {
        self.state = SyncState::Idle;
        self.progress_percent = 100.0;
        self.last_sync_time = Some(started_at);
        self.last_error = None;
    }

    pub fn finish_err(&mut self, started_at: OffsetDateTime, message: impl Into<String>) {
        self.state = SyncState::Error;
        self.last_sync_time = Some(started_at);
        self.last_error = Some(message.into());
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_bounded_and_tracks_counts() {
        let mut status = SyncStatus::unknown();
        status.begin_cycle(None);
        status.record_progress(1, 4);
        assert_eq!(status.progress_percent, 25.0);
        status.record_progress(0, 0);
        assert_eq!(status.progress_percent, 0.0);
    }

    #[test]
    fn cycle_transitions_follow_state_machine() {
        let started = OffsetDateTime::UNIX_EPOCH;
        let mut status = SyncStatus::unknown();

        status.begin_cycle(None);
        assert_eq!(status.state, SyncState::Syncing);

        status.finish_err(started, "clone failed");
        assert_eq!(status.state, SyncState::Error);
        assert_eq!(status.last_error.as_deref(), Some("clone failed"));

        status.begin_cycle(None);
        assert!(status.last_error.is_none());
        status.finish_ok(started);
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.progress_percent, 100.0);
        assert_eq!(status.last_sync_time, Some(started));
    }
}
