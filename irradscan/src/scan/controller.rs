//! Scan controller: sequences the stage through a serpentine raster scan.
//!
//! # Architecture
//!
//! ```text
//!  caller thread                          "scan-worker" thread
//! ┌────────────────────┐   start()      ┌──────────────────────────────────┐
//! │ prepare/start/stop │ ─────────────► │ move to start, scan_init         │
//! │ finish/pause/join  │                │ loop sweeps:                     │
//! └─────────┬──────────┘                │   per row: stop? pause wait      │
//!           │ ScanSignals (Arc)         │            move y, scan_start    │
//!           └──────────────────────────►│            move x, scan_stop     │
//!                                       │            RowEvent ─► log, subs │
//!                                       │   finish? at sweep boundary      │
//!                                       │ cleanup (always): scan_finished, │
//!                                       │   reset speeds, back to origin,  │
//!                                       │   clear signals                  │
//!                                       └──────────────────────────────────┘
//! ```
//!
//! The stage lives behind a mutex that the worker holds only for the
//! duration of a single row or positioning step, so callers can query
//! positions between rows.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::area::ScanArea;
use super::error::{Result, ScanError};
use super::record::RowEvent;
use super::signals::{PauseOutcome, ScanSignals};
use super::state::{ScanState, StateCell};
use crate::clock::now_timestamp;
use crate::stage::{AxisId, Position, XyStage};
use crate::telemetry::{TelemetryEvent, TelemetryPublisher};

/// Default interval at which a paused worker re-checks its signals.
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(100);

/// Name of the sweep worker thread.
pub const WORKER_THREAD_NAME: &str = "scan-worker";

/// A pause warning is logged every this many poll intervals.
const PAUSE_WARN_POLLS: u32 = 10;

/// How a scan run ended.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Ended at a sweep boundary after a finish request.
    Finished,
    /// Aborted at a row boundary after a stop request.
    Stopped,
    /// An axis command failed; the scan was cleaned up.
    Failed(ScanError),
}

/// Summary of a completed scan run.
#[derive(Debug)]
pub struct ScanReport {
    /// How the run ended.
    pub outcome: ScanOutcome,
    /// State after cleanup.
    pub final_state: ScanState,
    /// Sweeps completed in full.
    pub sweeps_completed: u32,
    /// Rows scanned during the run, in time order.
    pub rows: Vec<RowEvent>,
    /// Error raised by cleanup itself, if any.
    pub cleanup_error: Option<ScanError>,
}

impl ScanReport {
    /// Whether the run ended without an axis failure.
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, ScanOutcome::Failed(_)) && self.cleanup_error.is_none()
    }
}

/// State shared between the controller and its worker.
struct Shared {
    stage: Mutex<XyStage>,
    state: StateCell,
    signals: Arc<ScanSignals>,
    area: Mutex<Option<ScanArea>>,
    rows: Mutex<Vec<RowEvent>>,
    row_subscribers: Mutex<Vec<mpsc::UnboundedSender<RowEvent>>>,
    publisher: Option<TelemetryPublisher>,
    pause_poll: Duration,
}

/// Cancellable raster-scan state machine.
///
/// The controller owns the stage for its whole lifetime. Commands return
/// immediately; the sweep loop runs on a dedicated worker thread.
pub struct ScanController {
    inner: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<ScanReport>>>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("state", &self.inner.state.get())
            .field("area", &*self.inner.area.lock())
            .field("rows", &self.inner.rows.lock().len())
            .finish()
    }
}

impl ScanController {
    /// Creates an idle controller around a stage.
    pub fn new(stage: XyStage) -> Self {
        Self {
            inner: Arc::new(Shared {
                stage: Mutex::new(stage),
                state: StateCell::default(),
                signals: Arc::new(ScanSignals::new()),
                area: Mutex::new(None),
                rows: Mutex::new(Vec::new()),
                row_subscribers: Mutex::new(Vec::new()),
                publisher: None,
                pause_poll: DEFAULT_PAUSE_POLL,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Publishes scan telemetry on `publisher`.
    ///
    /// Builder methods only take effect before the first `start`.
    pub fn with_publisher(mut self, publisher: TelemetryPublisher) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(shared) => shared.publisher = Some(publisher),
            None => warn!("Controller already started, publisher not attached"),
        }
        self
    }

    /// Sets the interval at which a paused scan re-checks its signals.
    pub fn with_pause_poll(mut self, pause_poll: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(shared) => shared.pause_poll = pause_poll,
            None => warn!("Controller already started, pause poll unchanged"),
        }
        self
    }

    // =========================================================================
    // Control surface
    // =========================================================================

    /// Prepares a scan area relative to the current stage position.
    ///
    /// The current position becomes the area's origin, to which the stage
    /// returns after every scan.
    ///
    /// # Errors
    ///
    /// - [`ScanError::AlreadyRunning`] while a scan is active
    /// - [`ScanError::InvalidGeometry`] / [`ScanError::InvalidScanSpeed`] for
    ///   degenerate parameters
    pub fn prepare(
        &self,
        rel_start: Position,
        rel_end: Position,
        scan_speed: f64,
        step_size: f64,
    ) -> Result<ScanArea> {
        let current = self.inner.state.get();
        if current.is_active() {
            return Err(ScanError::AlreadyRunning(current));
        }

        let origin = self.inner.stage.lock().positions()?;
        let area = ScanArea::from_relative(origin, rel_start, rel_end, scan_speed, step_size)?;

        self.inner
            .state
            .transition(|s| !s.is_active(), ScanState::Preparing)
            .map_err(ScanError::AlreadyRunning)?;
        *self.inner.area.lock() = Some(area.clone());

        info!(
            origin_x = origin.x,
            origin_y = origin.y,
            n_rows = area.n_rows(),
            step_size = area.step_size,
            scan_speed = area.scan_speed,
            "Scan area prepared"
        );
        Ok(area)
    }

    /// Starts the sweep loop on a worker thread.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NotPrepared`] if no area has been prepared
    /// - [`ScanError::AlreadyRunning`] if a scan is active
    /// - [`ScanError::Worker`] if the thread cannot be spawned
    pub fn start(&self) -> Result<()> {
        let area = self
            .inner
            .area
            .lock()
            .clone()
            .ok_or(ScanError::NotPrepared)?;

        // Held until the worker is stored so starts are serialized
        let mut worker = self.worker.lock();
        let current = self.inner.state.get();
        if !current.can_start() {
            return Err(ScanError::AlreadyRunning(current));
        }

        // Signals are rearmed while stop() is still a no-op; a stop issued
        // once the state reads Scanning reaches the new worker.
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }
        self.inner.rows.lock().clear();
        self.inner.signals.rearm();
        self.inner
            .state
            .transition(ScanState::can_start, ScanState::Scanning)
            .map_err(ScanError::AlreadyRunning)?;

        let shared = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_scan(&shared, &area));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!(state = %ScanState::Scanning, "Scan started");
                Ok(())
            }
            Err(e) => {
                self.inner.state.set(ScanState::Idle);
                error!(error = %e, "Failed to spawn scan worker");
                Err(ScanError::Worker(e.to_string()))
            }
        }
    }

    /// Requests an abort at the next row boundary. A no-op when no scan is
    /// running.
    pub fn stop(&self) {
        match self.inner.state.get() {
            ScanState::Scanning | ScanState::Paused => {
                info!("Stop requested");
                self.inner.signals.request_stop();
            }
            state => debug!(state = %state, "Stop ignored, no scan running"),
        }
    }

    /// Requests termination after the current sweep. A no-op when no scan
    /// is running.
    pub fn finish(&self) {
        match self.inner.state.get() {
            ScanState::Scanning | ScanState::Paused => {
                info!("Finish requested, scan ends after the current sweep");
                self.inner.signals.request_finish();
            }
            state => debug!(state = %state, "Finish ignored, no scan running"),
        }
    }

    /// Sets or clears the pause signal.
    pub fn pause(&self, active: bool) {
        if self.inner.signals.is_paused() != active {
            info!(active, "Pause signal changed");
        }
        self.inner.signals.set_pause(active);
    }

    /// Scans a single row from the area origin and returns to it.
    ///
    /// Runs on the calling thread: x moves to the area start, y to the row,
    /// the row is scanned at `scan_speed`, then cleanup runs as for a full
    /// scan.
    pub fn scan_row(&self, row: usize, scan_speed: f64) -> Result<RowEvent> {
        let area = self
            .inner
            .area
            .lock()
            .clone()
            .ok_or(ScanError::NotPrepared)?;
        let y = area.row_y(row).ok_or(ScanError::UnknownRow {
            row,
            n_rows: area.n_rows(),
        })?;
        if !(scan_speed.is_finite() && scan_speed > 0.0) {
            return Err(ScanError::InvalidScanSpeed(scan_speed));
        }

        {
            let _starting = self.worker.lock();
            self.inner
                .state
                .transition(ScanState::can_start, ScanState::Scanning)
                .map_err(ScanError::AlreadyRunning)?;
        }
        info!(row, scan_speed, "Single-row scan");

        let result = self
            .inner
            .move_to_row(&area, y, scan_speed)
            .and_then(|()| self.inner.scan_one_row(&area, row, None, false));

        if let Err(e) = &result {
            error!(row, error = %e, "Single-row scan failed");
            self.inner.state.set(ScanState::Errored);
        }
        let cleanup = self.inner.cleanup(&area);
        self.inner.state.set(ScanState::Idle);

        let event = result?;
        cleanup?;
        Ok(event)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.inner.state.get()
    }

    /// Blocks until `predicate` holds or `timeout` elapses.
    pub fn wait_until(
        &self,
        predicate: impl Fn(ScanState) -> bool,
        timeout: Duration,
    ) -> Option<ScanState> {
        self.inner.state.wait_until(predicate, timeout)
    }

    /// Waits for the worker to exit and returns its report.
    ///
    /// Returns `Ok(None)` if no worker has been started since the last join.
    pub fn join(&self) -> Result<Option<ScanReport>> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(None);
        };
        handle
            .join()
            .map(Some)
            .map_err(|_| ScanError::Worker("scan worker panicked".to_string()))
    }

    /// Prepared scan area.
    pub fn area(&self) -> Option<ScanArea> {
        self.inner.area.lock().clone()
    }

    /// Row events recorded by the current or last scan.
    pub fn row_events(&self) -> Vec<RowEvent> {
        self.inner.rows.lock().clone()
    }

    /// Receives every row event recorded from now on.
    ///
    /// The receiver closes when the next scan ends, after cleanup.
    pub fn subscribe_rows(&self) -> mpsc::UnboundedReceiver<RowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.row_subscribers.lock().push(tx);
        rx
    }

    /// Current stage position. Blocks while the worker is moving.
    pub fn stage_position(&self) -> Result<Position> {
        Ok(self.inner.stage.lock().positions()?)
    }

    /// Runs `f` with exclusive access to the stage.
    pub fn with_stage<R>(&self, f: impl FnOnce(&mut XyStage) -> R) -> R {
        f(&mut self.inner.stage.lock())
    }

    /// Signals shared with the worker, e.g. for a beam-quality monitor.
    pub fn signals(&self) -> Arc<ScanSignals> {
        Arc::clone(&self.inner.signals)
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            self.inner.signals.request_stop();
            let _ = handle.join();
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

enum Completion {
    Finished(u32),
    Stopped(u32),
}

fn run_scan(shared: &Shared, area: &ScanArea) -> ScanReport {
    let result = shared.sweep_loop(area);

    let (outcome, final_state, sweeps_completed) = match result {
        Ok(Completion::Finished(sweeps)) => {
            info!(sweeps, "Scan finished at sweep boundary");
            (ScanOutcome::Finished, ScanState::Finished, sweeps)
        }
        Ok(Completion::Stopped(sweeps)) => {
            shared.state.set(ScanState::Stopping);
            info!(sweeps, "Scan stopped");
            (ScanOutcome::Stopped, ScanState::Idle, sweeps)
        }
        Err(e) => {
            shared.state.set(ScanState::Errored);
            error!(error = %e, "Scan aborted");
            let sweeps = shared.completed_sweeps(area);
            (ScanOutcome::Failed(e), ScanState::Idle, sweeps)
        }
    };

    let cleanup_error = shared.cleanup(area).err();
    shared.state.set(final_state);
    info!(state = %final_state, "Scan worker exiting");

    ScanReport {
        outcome,
        final_state,
        sweeps_completed,
        rows: shared.rows.lock().clone(),
        cleanup_error,
    }
}

impl Shared {
    fn publish(&self, event: TelemetryEvent) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(event);
        }
    }

    /// Moves x to the start edge, then y to `y`, and sets the scan speed.
    fn move_to_row(&self, area: &ScanArea, y: f64, scan_speed: f64) -> Result<()> {
        let mut stage = self.stage.lock();
        stage.move_absolute(AxisId::X, area.start_pos.x)?;
        stage.move_absolute(AxisId::Y, y)?;
        stage.set_speed(AxisId::X, scan_speed)?;
        Ok(())
    }

    fn sweep_loop(&self, area: &ScanArea) -> Result<Completion> {
        self.move_to_row(area, area.start_pos.y, area.scan_speed)?;
        self.publish(TelemetryEvent::ScanInit {
            n_rows: area.n_rows(),
            step_size: area.step_size,
        });

        let mut sweep: u32 = 0;
        loop {
            debug!(sweep, "Sweep started");
            for row in area.sweep_rows(sweep) {
                if self.signals.is_stop_requested() {
                    return Ok(Completion::Stopped(sweep));
                }
                if self.wait_if_paused() == PauseOutcome::Stopped {
                    return Ok(Completion::Stopped(sweep));
                }
                self.scan_one_row(area, row, Some(sweep), true)?;
            }
            sweep += 1;
            if self.signals.is_finish_requested() {
                return Ok(Completion::Finished(sweep));
            }
        }
    }

    fn wait_if_paused(&self) -> PauseOutcome {
        let mut paused = false;
        let poll = self.pause_poll;
        let outcome = self.signals.wait_while_paused(poll, |polls| {
            if polls == 0 {
                paused = true;
                self.state.set(ScanState::Paused);
            }
            if polls % PAUSE_WARN_POLLS == 0 {
                warn!(
                    waited_ms = (poll * polls).as_millis() as u64,
                    "Scan paused, waiting for beam before next row"
                );
            }
        });
        if paused && outcome == PauseOutcome::Resumed {
            info!("Scan resumed");
            self.state.set(ScanState::Scanning);
        }
        outcome
    }

    fn scan_one_row(
        &self,
        area: &ScanArea,
        row: usize,
        sweep: Option<u32>,
        move_y: bool,
    ) -> Result<RowEvent> {
        let y = area.row_y(row).ok_or(ScanError::UnknownRow {
            row,
            n_rows: area.n_rows(),
        })?;

        let event = {
            let mut stage = self.stage.lock();
            if move_y {
                stage.move_absolute(AxisId::Y, y)?;
            }
            let start = stage.positions()?;
            let speed = stage.speed(AxisId::X)?;
            let target = opposite_edge(area, start.x);

            self.publish(TelemetryEvent::ScanStart {
                row,
                sweep,
                speed,
                x_start: start.x,
                y_start: start.y,
            });
            let start_timestamp = now_timestamp();
            stage.move_absolute(AxisId::X, target)?;
            let stop_timestamp = now_timestamp();
            let stop = stage.positions()?;
            self.publish(TelemetryEvent::ScanStop {
                x_stop: stop.x,
                y_stop: stop.y,
            });

            RowEvent {
                row_index: row,
                sweep_index: sweep,
                start_timestamp,
                stop_timestamp,
                x_start: start.x,
                x_stop: stop.x,
                y_start: start.y,
                scan_speed: speed,
            }
        };

        debug!(
            row,
            sweep = ?sweep,
            duration_s = event.duration(),
            x_stop = event.x_stop,
            "Row scanned"
        );
        self.rows.lock().push(event);
        self.row_subscribers
            .lock()
            .retain(|tx| tx.send(event).is_ok());
        Ok(event)
    }

    fn completed_sweeps(&self, area: &ScanArea) -> u32 {
        let rows = self.rows.lock().len();
        (rows / area.n_rows().max(1)) as u32
    }

    /// Runs after every scan, regardless of how it ended.
    fn cleanup(&self, area: &ScanArea) -> Result<()> {
        self.publish(TelemetryEvent::ScanFinished);

        let result = {
            let mut stage = self.stage.lock();
            stage
                .reset_speeds()
                .and_then(|()| stage.move_to(area.origin).map(|_| ()))
        };
        self.signals.reset();
        self.row_subscribers.lock().clear();

        match result {
            Ok(()) => {
                debug!(x = area.origin.x, y = area.origin.y, "Stage returned to origin");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Cleanup failed, stage position unknown");
                Err(e.into())
            }
        }
    }
}

/// X target of a row: the area edge farther from the current position.
fn opposite_edge(area: &ScanArea, x: f64) -> f64 {
    if (x - area.start_pos.x).abs() <= (x - area.end_pos.x).abs() {
        area.end_pos.x
    } else {
        area.start_pos.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::SimulatedAxis;

    fn controller() -> ScanController {
        let stage = XyStage::new(
            Box::new(SimulatedAxis::new("x")),
            Box::new(SimulatedAxis::new("y")),
        );
        ScanController::new(stage).with_pause_poll(Duration::from_millis(5))
    }

    fn square() -> (Position, Position) {
        (Position::new(0.0, 0.0), Position::new(4.0, 3.0))
    }

    #[test]
    fn test_start_requires_prepare() {
        let c = controller();
        assert!(matches!(c.start(), Err(ScanError::NotPrepared)));
        assert_eq!(c.state(), ScanState::Idle);
    }

    #[test]
    fn test_prepare_uses_current_position_as_origin() {
        let c = controller();
        c.with_stage(|s| s.move_to(Position::new(5.0, 7.0))).unwrap();

        let (start, end) = square();
        let area = c.prepare(start, end, 10.0, 1.0).unwrap();
        assert_eq!(area.origin, Position::new(5.0, 7.0));
        assert_eq!(area.start_pos, Position::new(5.0, 7.0));
        assert_eq!(area.n_rows(), 3);
        assert_eq!(c.state(), ScanState::Preparing);
    }

    #[test]
    fn test_prepare_rejects_degenerate_geometry() {
        let c = controller();
        let p = Position::new(1.0, 1.0);
        assert!(matches!(
            c.prepare(p, p, 10.0, 1.0),
            Err(ScanError::InvalidGeometry(_))
        ));
        assert!(matches!(
            c.prepare(Position::default(), p, 10.0, 0.0),
            Err(ScanError::InvalidGeometry(_))
        ));
        assert_eq!(c.state(), ScanState::Idle);
    }

    #[test]
    fn test_stop_and_finish_are_noops_when_idle() {
        let c = controller();
        c.stop();
        c.finish();
        assert!(!c.signals().is_stop_requested());
        assert!(!c.signals().is_finish_requested());
    }

    #[test]
    fn test_finish_ends_on_sweep_boundary() {
        let c = controller();
        let (start, end) = square();
        c.prepare(start, end, 10.0, 1.0).unwrap();
        c.finish();
        c.start().unwrap();
        c.finish();

        let report = c.join().unwrap().unwrap();
        assert!(matches!(report.outcome, ScanOutcome::Finished));
        assert_eq!(report.final_state, ScanState::Finished);
        assert_eq!(c.state(), ScanState::Finished);
        assert_eq!(report.rows.len() % 3, 0);
        assert_eq!(report.rows.len() as u32, report.sweeps_completed * 3);
        assert_eq!(c.stage_position().unwrap(), Position::new(0.0, 0.0));
    }

    #[test]
    fn test_serpentine_directions() {
        let c = controller();
        let (start, end) = square();
        c.prepare(start, end, 10.0, 1.0).unwrap();
        c.start().unwrap();
        c.finish();
        let report = c.join().unwrap().unwrap();

        let first: Vec<_> = report.rows.iter().take(3).collect();
        assert_eq!(
            first.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!((first[0].x_start, first[0].x_stop), (0.0, 4.0));
        assert_eq!((first[1].x_start, first[1].x_stop), (4.0, 0.0));
        assert_eq!((first[2].x_start, first[2].x_stop), (0.0, 4.0));
        assert!(first.iter().all(|r| r.sweep_index == Some(0)));
    }

    #[test]
    fn test_scan_row_returns_to_origin() {
        let c = controller();
        let (start, end) = square();
        c.prepare(start, end, 10.0, 1.0).unwrap();

        let event = c.scan_row(2, 20.0).unwrap();
        assert_eq!(event.row_index, 2);
        assert_eq!(event.sweep_index, None);
        assert_eq!(event.y_start, 2.0);
        assert_eq!(event.scan_speed, 20.0);
        assert_eq!((event.x_start, event.x_stop), (0.0, 4.0));
        assert_eq!(c.state(), ScanState::Idle);
        assert_eq!(c.stage_position().unwrap(), Position::new(0.0, 0.0));
        assert_eq!(c.with_stage(|s| s.speed(AxisId::X)).unwrap(), 10.0);
    }

    #[test]
    fn test_scan_row_rejects_unknown_row() {
        let c = controller();
        let (start, end) = square();
        c.prepare(start, end, 10.0, 1.0).unwrap();
        assert!(matches!(
            c.scan_row(3, 10.0),
            Err(ScanError::UnknownRow { row: 3, n_rows: 3 })
        ));
        assert!(matches!(
            c.scan_row(0, -1.0),
            Err(ScanError::InvalidScanSpeed(_))
        ));
    }

    #[test]
    fn test_opposite_edge() {
        let area = ScanArea::from_relative(
            Position::default(),
            Position::new(-2.0, 0.0),
            Position::new(6.0, 3.0),
            10.0,
            1.0,
        )
        .unwrap();
        assert_eq!(opposite_edge(&area, -2.0), 6.0);
        assert_eq!(opposite_edge(&area, 6.0), -2.0);
        assert_eq!(opposite_edge(&area, 0.0), 6.0);
    }
}
