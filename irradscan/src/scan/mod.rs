//! Raster-scan control.
//!
//! A [`ScanController`] owns the [`XyStage`](crate::stage::XyStage) and runs
//! a serpentine scan over a [`ScanArea`] on a dedicated worker thread. Each
//! row traversal is recorded as a [`RowEvent`]; the row log together with
//! the beam current forms a [`ScanRecord`] for fluence reconstruction.
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
//!
//! # Example
//!
//! ```
//! use irradscan::scan::{ScanController, ScanState};
//! use irradscan::stage::{Position, SimulatedAxis, XyStage};
//!
//! let stage = XyStage::new(
//!     Box::new(SimulatedAxis::new("x")),
//!     Box::new(SimulatedAxis::new("y")),
//! );
//! let controller = ScanController::new(stage);
//! controller
//!     .prepare(Position::new(0.0, 0.0), Position::new(5.0, 2.0), 10.0, 1.0)
//!     .unwrap();
//! controller.start().unwrap();
//! controller.finish();
//!
//! let report = controller.join().unwrap().unwrap();
//! assert_eq!(report.final_state, ScanState::Finished);
//! assert_eq!(report.rows.len() % 2, 0);
//! ```

mod area;
mod controller;
mod error;
mod record;
mod signals;
mod state;

pub use area::ScanArea;
pub use controller::{
    ScanController, ScanOutcome, ScanReport, DEFAULT_PAUSE_POLL, WORKER_THREAD_NAME,
};
pub use error::{Result, ScanError};
pub use record::{RowEvent, ScanRecord};
pub use signals::{PauseOutcome, ScanSignals};
pub use state::ScanState;
