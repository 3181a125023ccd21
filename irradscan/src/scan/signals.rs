//! External control signals observed by the scan worker.
//!
//! Signals are cooperative: the worker checks `stop` before every row,
//! `finish` after every sweep, and blocks on `pause` before starting a row.
//! A pause wait wakes up as soon as the pause is cleared or a stop is
//! requested, and otherwise every poll interval so the worker can log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

/// How a pause wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The pause was cleared (or was never set).
    Resumed,
    /// A stop was requested while waiting.
    Stopped,
}

/// Stop, finish and pause flags shared between the controller and its worker.
#[derive(Debug)]
pub struct ScanSignals {
    stop: Mutex<CancellationToken>,
    finish: AtomicBool,
    pause: Mutex<bool>,
    pause_changed: Condvar,
}

impl Default for ScanSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSignals {
    /// Creates cleared signals.
    pub fn new() -> Self {
        Self {
            stop: Mutex::new(CancellationToken::new()),
            finish: AtomicBool::new(false),
            pause: Mutex::new(false),
            pause_changed: Condvar::new(),
        }
    }

    /// Token cancelled by the next [`request_stop`](Self::request_stop).
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.lock().clone()
    }

    /// Requests an abort at the next row boundary.
    pub fn request_stop(&self) {
        self.stop.lock().cancel();
        // Wake a worker blocked in a pause wait
        let _guard = self.pause.lock();
        self.pause_changed.notify_all();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.lock().is_cancelled()
    }

    /// Requests termination after the current sweep.
    pub fn request_finish(&self) {
        self.finish.store(true, Ordering::SeqCst);
    }

    /// Whether a finish has been requested.
    pub fn is_finish_requested(&self) -> bool {
        self.finish.load(Ordering::SeqCst)
    }

    /// Sets or clears the pause.
    pub fn set_pause(&self, active: bool) {
        let mut pause = self.pause.lock();
        *pause = active;
        self.pause_changed.notify_all();
    }

    /// Whether the pause is set.
    pub fn is_paused(&self) -> bool {
        *self.pause.lock()
    }

    /// Blocks while the pause is set.
    ///
    /// `on_wait` is called with the number of poll intervals waited so far
    /// (starting at 0) before each wait.
    pub fn wait_while_paused(&self, poll: Duration, mut on_wait: impl FnMut(u32)) -> PauseOutcome {
        let mut polls = 0;
        let mut pause = self.pause.lock();
        loop {
            if self.is_stop_requested() {
                return PauseOutcome::Stopped;
            }
            if !*pause {
                return PauseOutcome::Resumed;
            }
            on_wait(polls);
            polls = polls.saturating_add(1);
            self.pause_changed.wait_for(&mut pause, poll);
        }
    }

    /// Clears stop and finish, keeping the pause.
    pub fn rearm(&self) {
        let mut stop = self.stop.lock();
        if stop.is_cancelled() {
            *stop = CancellationToken::new();
        }
        self.finish.store(false, Ordering::SeqCst);
    }

    /// Clears every signal and arms a fresh stop token.
    pub fn reset(&self) {
        *self.stop.lock() = CancellationToken::new();
        self.finish.store(false, Ordering::SeqCst);
        self.set_pause(false);
    }
}
