//! Two-axis stage built from a pair of [`Axis`] implementations.
//!
//! Every move is carried out in two explicit steps:
//!
//! ```text
//! move_absolute ──► perform_move ──► MoveReport ──► record_move
//!                   (axis I/O,        {start, stop,   (travel counters,
//!                    reply check)      speed, travel}   move_start/move_stop)
//! ```
//!
//! A rejected acknowledgment becomes [`StageError::UnexpectedReply`] and
//! leaves travel counters and telemetry untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::axis::{Axis, AxisError, AxisId, AxisReply, AxisResult};
use super::config::{NamedPosition, StageConfig};
use super::error::{Result, StageError};
use crate::telemetry::{TelemetryEvent, TelemetryPublisher};
use crate::units::{DistanceUnit, SpeedUnit};

/// A stage position in mm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Component along one axis.
    pub fn get(&self, axis: AxisId) -> f64 {
        match axis {
            AxisId::X => self.x,
            AxisId::Y => self.y,
        }
    }
}

/// Outcome of a completed axis move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveReport {
    /// Moved axis.
    pub axis: AxisId,
    /// Position before the move in mm.
    pub start: f64,
    /// Position after the move in mm.
    pub stop: f64,
    /// Axis speed during the move in mm/s.
    pub speed: f64,
    /// Absolute distance travelled in mm.
    pub travel: f64,
}

/// Motorized XY stage.
pub struct XyStage {
    x: Box<dyn Axis>,
    y: Box<dyn Axis>,
    config: StageConfig,
    publisher: Option<TelemetryPublisher>,
}

impl std::fmt::Debug for XyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XyStage")
            .field("x", &self.x.name())
            .field("y", &self.y.name())
            .field("config", &self.config)
            .finish()
    }
}

impl XyStage {
    /// Creates a stage with default state and no telemetry.
    pub fn new(x: Box<dyn Axis>, y: Box<dyn Axis>) -> Self {
        Self {
            x,
            y,
            config: StageConfig::default(),
            publisher: None,
        }
    }

    /// Replaces the persisted state.
    pub fn with_config(mut self, config: StageConfig) -> Self {
        self.config = config;
        self
    }

    /// Publishes `move_start`/`move_stop` for every move.
    pub fn with_publisher(mut self, publisher: TelemetryPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Persisted state.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Mutable persisted state.
    pub fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }

    /// Writes the persisted state to `path`.
    pub fn save_config(&self, path: &Path) -> Result<()> {
        self.config.save(path)
    }

    fn axis_mut(&mut self, axis: AxisId) -> &mut dyn Axis {
        match axis {
            AxisId::X => self.x.as_mut(),
            AxisId::Y => self.y.as_mut(),
        }
    }

    // =========================================================================
    // Motion
    // =========================================================================

    /// Moves one axis to an absolute position in mm.
    pub fn move_absolute(&mut self, axis: AxisId, target_mm: f64) -> Result<MoveReport> {
        let report = self.perform_move(axis, |a| a.move_absolute(target_mm, DistanceUnit::Mm))?;
        self.record_move(&report);
        Ok(report)
    }

    /// Moves one axis by a distance in mm.
    pub fn move_relative(&mut self, axis: AxisId, distance_mm: f64) -> Result<MoveReport> {
        let report = self.perform_move(axis, |a| a.move_relative(distance_mm, DistanceUnit::Mm))?;
        self.record_move(&report);
        Ok(report)
    }

    /// Moves to a position, y-axis first so the beam does not cross the
    /// sample diagonally.
    pub fn move_to(&mut self, target: Position) -> Result<[MoveReport; 2]> {
        let y = self.move_absolute(AxisId::Y, target.y)?;
        let x = self.move_absolute(AxisId::X, target.x)?;
        Ok([y, x])
    }

    fn perform_move<F>(&mut self, axis: AxisId, command: F) -> Result<MoveReport>
    where
        F: FnOnce(&mut dyn Axis) -> AxisResult<AxisReply>,
    {
        let handle = self.axis_mut(axis);
        let start = handle
            .get_position(DistanceUnit::Mm)
            .map_err(|e| axis_error(axis, e))?;
        let speed = handle
            .get_speed(SpeedUnit::MmPerS)
            .map_err(|e| axis_error(axis, e))?;

        let reply = command(&mut *handle).map_err(|e| axis_error(axis, e))?;
        check_reply(axis, reply)?;

        let stop = handle
            .get_position(DistanceUnit::Mm)
            .map_err(|e| axis_error(axis, e))?;

        Ok(MoveReport {
            axis,
            start,
            stop,
            speed,
            travel: (stop - start).abs(),
        })
    }

    fn record_move(&mut self, report: &MoveReport) {
        let axis = report.axis;
        *self.config.interval_travel.get_mut(axis) += report.travel;
        *self.config.total_travel.get_mut(axis) += report.travel;

        if self.config.interval_travel.get(axis) >= self.config.maintenance_interval_mm {
            *self.config.interval_travel.get_mut(axis) = 0.0;
            warn!(
                axis = %axis,
                interval_mm = self.config.maintenance_interval_mm,
                total_mm = self.config.total_travel.get(axis),
                "Axis reached service interval travel, maintenance due"
            );
        }
        self.config.touch();

        if let Some(publisher) = &self.publisher {
            publisher.publish(TelemetryEvent::MoveStart {
                axis,
                position: report.start,
                speed: report.speed,
            });
            publisher.publish(TelemetryEvent::MoveStop {
                axis,
                position: report.stop,
                travel: report.travel,
            });
        }
    }

    // =========================================================================
    // Queries and speed
    // =========================================================================

    /// Current position of one axis in mm.
    pub fn position(&mut self, axis: AxisId) -> Result<f64> {
        self.axis_mut(axis)
            .get_position(DistanceUnit::Mm)
            .map_err(|e| axis_error(axis, e))
    }

    /// Current position of both axes in mm.
    pub fn positions(&mut self) -> Result<Position> {
        Ok(Position {
            x: self.position(AxisId::X)?,
            y: self.position(AxisId::Y)?,
        })
    }

    /// Sets the speed of one axis in mm/s.
    pub fn set_speed(&mut self, axis: AxisId, speed: f64) -> Result<()> {
        let reply = self
            .axis_mut(axis)
            .set_speed(speed, SpeedUnit::MmPerS)
            .map_err(|e| axis_error(axis, e))?;
        check_reply(axis, reply)
    }

    /// Speed of one axis in mm/s.
    pub fn speed(&mut self, axis: AxisId) -> Result<f64> {
        self.axis_mut(axis)
            .get_speed(SpeedUnit::MmPerS)
            .map_err(|e| axis_error(axis, e))
    }

    /// Restores the configured default speed on both axes.
    pub fn reset_speeds(&mut self) -> Result<()> {
        let speed = self.config.default_speed;
        self.set_speed(AxisId::X, speed)?;
        self.set_speed(AxisId::Y, speed)
    }

    // =========================================================================
    // Named positions
    // =========================================================================

    /// Stores or updates a named position.
    pub fn add_position(&mut self, name: &str, x: f64, y: f64, unit: DistanceUnit) {
        let date = chrono::Utc::now().to_rfc3339();
        if let Some(previous) = self.config.positions.get(name) {
            debug!(name, last_update = %previous.date, "Updating stored position");
        } else {
            info!(name, x, y, unit = %unit, "Adding stored position");
        }
        self.config
            .positions
            .insert(name.to_string(), NamedPosition { x, y, unit, date });
        self.config.touch();
    }

    /// Removes a named position. Returns `false` if it was not stored.
    pub fn remove_position(&mut self, name: &str) -> bool {
        if self.config.positions.remove(name).is_some() {
            self.config.touch();
            true
        } else {
            warn!(name, "Position unknown and therefore cannot be removed");
            false
        }
    }

    /// Moves to a named position.
    pub fn move_to_position(&mut self, name: &str) -> Result<[MoveReport; 2]> {
        let stored = self
            .config
            .positions
            .get(name)
            .ok_or_else(|| StageError::UnknownPosition {
                name: name.to_string(),
                known: self
                    .config
                    .positions
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        let target = Position::new(stored.unit.to_mm(stored.x), stored.unit.to_mm(stored.y));
        self.move_to(target)
    }
}

fn axis_error(axis: AxisId, source: AxisError) -> StageError {
    StageError::Axis { axis, source }
}

/// Turns a rejected acknowledgment into [`StageError::UnexpectedReply`].
pub fn check_reply(axis: AxisId, reply: AxisReply) -> Result<()> {
    if reply.is_ok() {
        debug!(axis = %axis, data = %reply.data, "Command acknowledged");
        Ok(())
    } else {
        Err(StageError::UnexpectedReply {
            axis,
            data: reply.data,
        })
    }
}
