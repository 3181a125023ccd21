//! IrradScan - raster-scan irradiation control and fluence reconstruction.
//!
//! This library drives a motorized XY stage through a serpentine raster
//! scan across a fixed particle beam, records when each row was scanned,
//! and reconstructs the spatial fluence delivered to the sample from those
//! row records and the measured beam current.
//!
//! # Modules
//!
//! - [`stage`]: axis capability, simulated axis, XY stage with travel
//!   accounting and named positions
//! - [`scan`]: scan area geometry and the cancellable scan controller
//! - [`sampler`]: beam current sampling and beam-quality pausing
//! - [`fluence`]: kinematic timing, Gaussian deposition and reconstruction
//! - [`telemetry`]: drop-tolerant fan-out of scan and motion events
//! - [`config`] / [`logging`]: user configuration and tracing setup

pub mod clock;
pub mod config;
pub mod fluence;
pub mod logging;
pub mod sampler;
pub mod scan;
pub mod stage;
pub mod telemetry;
pub mod units;

/// Library version from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use fluence::{FluenceMap, FluenceReconstructor, ReconstructionConfig};
pub use scan::{ScanController, ScanRecord, ScanState};
pub use stage::XyStage;
