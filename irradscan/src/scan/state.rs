//! Scan controller state.
//!
//! # State Machine
//!
//! ```text
//! Idle ──prepare──► Preparing ──start──► Scanning
//! Scanning ──row boundary & stop──► Stopping ──cleanup──► Idle
//! Scanning ──sweep boundary & finish──► Finished (after cleanup)
//! Scanning ──pause set──► Paused ──pause cleared──► Scanning
//! Scanning ──axis failure──► Errored ──cleanup──► Idle
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`ScanController`](super::ScanController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// No scan running.
    #[default]
    Idle,
    /// Area prepared, waiting for `start`.
    Preparing,
    /// Rows are being scanned.
    Scanning,
    /// Waiting for the pause signal to clear.
    Paused,
    /// Stop requested; cleaning up.
    Stopping,
    /// Completed at a sweep boundary after a finish request.
    Finished,
    /// An axis failed; cleaning up.
    Errored,
}

impl ScanState {
    /// Whether a scan worker owns the stage in this state.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ScanState::Scanning | ScanState::Paused | ScanState::Stopping | ScanState::Errored
        )
    }

    /// Whether `start` is accepted from this state.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            ScanState::Idle | ScanState::Preparing | ScanState::Finished
        )
    }

    /// State name.
    pub fn as_str(self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Preparing => "preparing",
            ScanState::Scanning => "scanning",
            ScanState::Paused => "paused",
            ScanState::Stopping => "stopping",
            ScanState::Finished => "finished",
            ScanState::Errored => "errored",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state slot with change notification.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    state: Mutex<ScanState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) fn get(&self) -> ScanState {
        *self.state.lock()
    }

    /// Stores a new state and returns the previous one.
    pub(crate) fn set(&self, state: ScanState) -> ScanState {
        let mut guard = self.state.lock();
        let previous = std::mem::replace(&mut *guard, state);
        self.changed.notify_all();
        previous
    }

    /// Atomically moves `from` one of `allowed` states to `to`.
    ///
    /// Returns the current state as error when it is not in `allowed`.
    pub(crate) fn transition(
        &self,
        allowed: impl Fn(ScanState) -> bool,
        to: ScanState,
    ) -> Result<ScanState, ScanState> {
        let mut guard = self.state.lock();
        if !allowed(*guard) {
            return Err(*guard);
        }
        let previous = std::mem::replace(&mut *guard, to);
        self.changed.notify_all();
        Ok(previous)
    }

    /// Blocks until `predicate` holds or `timeout` elapses; returns the
    /// state seen last.
    pub(crate) fn wait_until(
        &self,
        predicate: impl Fn(ScanState) -> bool,
        timeout: Duration,
    ) -> Option<ScanState> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock();
        while !predicate(*guard) {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                return predicate(*guard).then_some(*guard);
            }
        }
        Some(*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_permissions() {
        assert!(ScanState::Idle.can_start());
        assert!(ScanState::Preparing.can_start());
        assert!(ScanState::Finished.can_start());
        assert!(!ScanState::Scanning.can_start());
        assert!(!ScanState::Errored.can_start());
    }

    #[test]
    fn test_transition_rejects_disallowed() {
        let cell = StateCell::default();
        assert_eq!(
            cell.transition(ScanState::can_start, ScanState::Scanning),
            Ok(ScanState::Idle)
        );
        assert_eq!(
            cell.transition(ScanState::can_start, ScanState::Scanning),
            Err(ScanState::Scanning)
        );
    }

    #[test]
    fn test_wait_until_wakes_on_change() {
        let cell = Arc::new(StateCell::default());
        let setter = Arc::clone(&cell);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set(ScanState::Finished);
        });

        let seen = cell.wait_until(|s| s == ScanState::Finished, Duration::from_secs(5));
        assert_eq!(seen, Some(ScanState::Finished));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_until_times_out() {
        let cell = StateCell::default();
        let seen = cell.wait_until(|s| s == ScanState::Scanning, Duration::from_millis(10));
        assert_eq!(seen, None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ScanState::Stopping.to_string(), "stopping");
        assert_eq!(
            serde_json::to_string(&ScanState::Errored).unwrap(),
            "\"errored\""
        );
    }
}
