//! Fluence reconstruction from recorded row events and beam current.
//!
//! The beam spot is modelled as a 2D Gaussian that is deposited onto a
//! regular grid over the scan area. Charge is attributed to grid positions
//! by combining the row log with the beam current samples and the stage's
//! trapezoidal velocity profile.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐
//! │ Vec<RowEvent>│   │ BeamSampleStream   │
//! └──────┬───────┘   └─────────┬──────────┘
//!        │    BeamCursor /     │
//!        │    row_window       │
//!        ▼                     ▼
//! ┌──────────────────────────────────────┐      ┌───────────────────────┐
//! │        FluenceReconstructor          │◄─────│ compute_bin_transit_  │
//! │  wait deposit + per-bin scan deposit │      │ times (TrapezoidProf.)│
//! └──────────────────┬───────────────────┘      └───────────────────────┘
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │ FluenceAccumulator (Array2, kernel)  │──► merge (parallel reconstruction)
//! └──────────────────┬───────────────────┘
//!                    ▼ finish (×100: mm² → cm²)
//!               FluenceMap ──► save / load (JSON)
//! ```
//!
//! # Example
//!
//! ```
//! use irradscan::fluence::{FluenceAccumulator, FluenceGrid, KernelParams};
//!
//! let grid = FluenceGrid::new(20.0, 20.0, 40, 40).unwrap();
//! let mut acc = FluenceAccumulator::new(grid, KernelParams::default());
//! acc.deposit(10.0, 10.0, 1e6);
//! assert!((acc.integral() - 1e6).abs() / 1e6 < 1e-3);
//! ```

mod accumulator;
mod beam;
mod error;
mod kernel;
mod kinematics;
mod map;
mod reconstructor;

pub use accumulator::{FluenceAccumulator, FluenceGrid};
pub use beam::{BeamCursor, BeamSample, BeamSampleStream, RowWindow};
pub use error::{FluenceError, OrderingViolation, Result};
pub use kernel::{
    gauss_2d_norm, gauss_2d_pdf, gauss_2d_volume, KernelParams, DEFAULT_SIGMA_X, DEFAULT_SIGMA_Y,
    DEFAULT_SKIP_SIGMAS, MIN_SKIP_SIGMAS,
};
pub use kinematics::{
    compute_bin_transit_times, compute_bin_transit_times_into, TrapezoidProfile,
    DEFAULT_SCAN_ACCEL,
};
pub use map::{FluenceMap, DEFAULT_HARDNESS_FACTOR};
pub use reconstructor::{
    reconstruct, reconstruct_parallel, reconstruct_with, DirectionPolicy, FluenceReconstructor,
    LookupStrategy, ReconstructionConfig, RowDeposit, DEFAULT_BINS,
};
