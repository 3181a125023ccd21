//! In-memory axis for dry runs and tests.
//!
//! Moves complete instantly unless a time scale is set, in which case the
//! calling thread sleeps for the duration of the trapezoidal move profile
//! multiplied by the scale. Rejections can be injected to exercise the
//! scan controller's failure path.

use std::time::Duration;

use tracing::debug;

use super::axis::{Axis, AxisError, AxisReply, AxisResult};
use crate::fluence::TrapezoidProfile;
use crate::units::{DistanceUnit, SpeedUnit};

/// Default travel range of a simulated axis in mm.
pub const DEFAULT_SIMULATED_RANGE_MM: (f64, f64) = (-300.0, 300.0);

/// Default maximum speed of a simulated axis in mm/s.
pub const DEFAULT_SIMULATED_MAX_SPEED: f64 = 100.0;

/// Default acceleration of a simulated axis in mm/s².
pub const DEFAULT_SIMULATED_ACCEL: f64 = 2500.0;

/// Simulated linear axis.
#[derive(Debug, Clone)]
pub struct SimulatedAxis {
    name: String,
    position_mm: f64,
    speed: f64,
    accel: f64,
    range_mm: (f64, f64),
    max_speed: f64,
    time_scale: f64,
    moves: usize,
    reject_move: Option<usize>,
    disconnect_after: Option<usize>,
}

impl SimulatedAxis {
    /// Creates an axis at position 0 mm moving at 10 mm/s.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position_mm: 0.0,
            speed: 10.0,
            accel: DEFAULT_SIMULATED_ACCEL,
            range_mm: DEFAULT_SIMULATED_RANGE_MM,
            max_speed: DEFAULT_SIMULATED_MAX_SPEED,
            time_scale: 0.0,
            moves: 0,
            reject_move: None,
            disconnect_after: None,
        }
    }

    /// Sets the starting position in mm.
    pub fn with_position(mut self, position_mm: f64) -> Self {
        self.position_mm = position_mm;
        self
    }

    /// Sets the travel range in mm.
    pub fn with_range(mut self, min_mm: f64, max_mm: f64) -> Self {
        self.range_mm = (min_mm.min(max_mm), min_mm.max(max_mm));
        self
    }

    /// Sets the acceleration in mm/s².
    pub fn with_accel(mut self, accel: f64) -> Self {
        self.accel = accel;
        self
    }

    /// Sets the maximum accepted speed in mm/s.
    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    /// Sleeps for `scale` times the physical move duration on every move.
    ///
    /// `0.0` (the default) completes moves instantly.
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale.max(0.0);
        self
    }

    /// Rejects the `n`-th move command (1-based) once.
    pub fn with_reject_move(mut self, n: usize) -> Self {
        self.reject_move = Some(n);
        self
    }

    /// Fails with a transport error on every command after `n` moves.
    pub fn with_disconnect_after(mut self, n: usize) -> Self {
        self.disconnect_after = Some(n);
        self
    }

    /// Number of move commands received so far.
    pub fn move_count(&self) -> usize {
        self.moves
    }

    fn check_link(&self) -> AxisResult<()> {
        match self.disconnect_after {
            Some(n) if self.moves >= n => Err(AxisError::Transport(format!(
                "{} disconnected after {} moves",
                self.name, n
            ))),
            _ => Ok(()),
        }
    }

    fn travel_to(&mut self, target_mm: f64) -> AxisResult<AxisReply> {
        self.check_link()?;
        self.moves += 1;

        if matches!(self.reject_move, Some(n) if self.moves == n) {
            debug!(axis = %self.name, target_mm, "Simulated rejection");
            return Ok(AxisReply::rejected("injected rejection"));
        }
        if !target_mm.is_finite() || target_mm < self.range_mm.0 || target_mm > self.range_mm.1 {
            return Ok(AxisReply::rejected(format!(
                "target {target_mm} mm outside [{}, {}]",
                self.range_mm.0, self.range_mm.1
            )));
        }

        let distance = (target_mm - self.position_mm).abs();
        if self.time_scale > 0.0 && distance > 0.0 {
            let duration = TrapezoidProfile::new(distance, self.speed, self.accel)
                .map(|p| p.total_time())
                .unwrap_or(distance / self.speed);
            std::thread::sleep(Duration::from_secs_f64(duration * self.time_scale));
        }

        self.position_mm = target_mm;
        Ok(AxisReply::ok(format!("{target_mm:.6}")))
    }
}

impl Axis for SimulatedAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn move_absolute(&mut self, position: f64, unit: DistanceUnit) -> AxisResult<AxisReply> {
        self.travel_to(unit.to_mm(position))
    }

    fn move_relative(&mut self, distance: f64, unit: DistanceUnit) -> AxisResult<AxisReply> {
        self.travel_to(self.position_mm + unit.to_mm(distance))
    }

    fn get_position(&mut self, unit: DistanceUnit) -> AxisResult<f64> {
        self.check_link()?;
        Ok(unit.from_mm(self.position_mm))
    }

    fn set_speed(&mut self, value: f64, unit: SpeedUnit) -> AxisResult<AxisReply> {
        self.check_link()?;
        let speed = unit.to_mm_per_s(value);
        if !(speed.is_finite() && speed > 0.0 && speed <= self.max_speed) {
            return Ok(AxisReply::rejected(format!(
                "speed {speed} mm/s outside (0, {}]",
                self.max_speed
            )));
        }
        self.speed = speed;
        Ok(AxisReply::ok(format!("{speed:.6}")))
    }

    fn get_speed(&mut self, unit: SpeedUnit) -> AxisResult<f64> {
        self.check_link()?;
        Ok(unit.from_mm_per_s(self.speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_moves_and_units() {
        let mut axis = SimulatedAxis::new("x");
        assert!(axis.move_absolute(2.0, DistanceUnit::Cm).unwrap().is_ok());
        assert_close(axis.get_position(DistanceUnit::Mm).unwrap(), 20.0);

        assert!(axis.move_relative(-5.0, DistanceUnit::Mm).unwrap().is_ok());
        assert_close(axis.get_position(DistanceUnit::Mm).unwrap(), 15.0);
        assert_eq!(axis.move_count(), 2);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let mut axis = SimulatedAxis::new("x").with_range(0.0, 50.0);
        let reply = axis.move_absolute(60.0, DistanceUnit::Mm).unwrap();
        assert!(!reply.is_ok());
        assert_close(axis.get_position(DistanceUnit::Mm).unwrap(), 0.0);
    }

    #[test]
    fn test_speed_limits() {
        let mut axis = SimulatedAxis::new("y").with_max_speed(20.0);
        assert!(axis.set_speed(1.5, SpeedUnit::CmPerS).unwrap().is_ok());
        assert_close(axis.get_speed(SpeedUnit::MmPerS).unwrap(), 15.0);
        assert!(!axis.set_speed(25.0, SpeedUnit::MmPerS).unwrap().is_ok());
        assert!(!axis.set_speed(0.0, SpeedUnit::MmPerS).unwrap().is_ok());
    }

    #[test]
    fn test_injected_rejection() {
        let mut axis = SimulatedAxis::new("x").with_reject_move(2);
        assert!(axis.move_absolute(1.0, DistanceUnit::Mm).unwrap().is_ok());
        assert!(!axis.move_absolute(2.0, DistanceUnit::Mm).unwrap().is_ok());
        assert!(axis.move_absolute(3.0, DistanceUnit::Mm).unwrap().is_ok());
        assert_close(axis.get_position(DistanceUnit::Mm).unwrap(), 3.0);
    }

    #[test]
    fn test_disconnect() {
        let mut axis = SimulatedAxis::new("x").with_disconnect_after(1);
        assert!(axis.move_absolute(1.0, DistanceUnit::Mm).is_ok());
        assert!(matches!(
            axis.get_position(DistanceUnit::Mm),
            Err(AxisError::Transport(_))
        ));
    }

    #[test]
    fn test_time_scale_sleeps() {
        // 10 mm at 100 mm/s with 1000 mm/s²: 0.1 s cruise + 0.1 s ramps
        let mut axis = SimulatedAxis::new("x")
            .with_accel(1000.0)
            .with_time_scale(0.1);
        axis.set_speed(100.0, SpeedUnit::MmPerS).unwrap();

        let started = std::time::Instant::now();
        axis.move_absolute(10.0, DistanceUnit::Mm).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(18));
    }
}
