//! Motorized XY stage.
//!
//! The stage is assembled from two independent linear axes behind the
//! [`Axis`] trait. Concrete controller families implement the trait and are
//! chosen when the stage is built; the scan layer only sees [`XyStage`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 XyStage                   │
//! │  ┌──────────────┐    ┌──────────────┐     │     ┌──────────────────┐
//! │  │ Box<dyn Axis>│    │ Box<dyn Axis>│     │────►│TelemetryPublisher│
//! │  │      x       │    │      y       │     │     └──────────────────┘
//! │  └──────────────┘    └──────────────┘     │
//! │  StageConfig: travel, named positions     │────► save(path)
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use irradscan::stage::{AxisId, SimulatedAxis, XyStage};
//!
//! let mut stage = XyStage::new(
//!     Box::new(SimulatedAxis::new("x")),
//!     Box::new(SimulatedAxis::new("y")),
//! );
//! let report = stage.move_absolute(AxisId::X, 5.0).unwrap();
//! assert_eq!(report.travel, 5.0);
//! ```

mod axis;
mod config;
mod error;
mod simulated;
mod xy_stage;

pub use axis::{Axis, AxisError, AxisId, AxisReply, AxisResult, ReplyFlag};
pub use config::{
    AxisTravel, NamedPosition, StageConfig, DEFAULT_MAINTENANCE_INTERVAL_MM, DEFAULT_STAGE_SPEED,
};
pub use error::{Result, StageError};
pub use simulated::{
    SimulatedAxis, DEFAULT_SIMULATED_ACCEL, DEFAULT_SIMULATED_MAX_SPEED,
    DEFAULT_SIMULATED_RANGE_MM,
};
pub use xy_stage::{check_reply, MoveReport, Position, XyStage};
