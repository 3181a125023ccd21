//! Transit-time model for a scanned row.
//!
//! The x-axis accelerates from rest to the scan speed, cruises, and
//! decelerates back to rest at the far edge (trapezoidal velocity profile).
//! The time spent above each map bin follows from inverting the
//! position-time curve of that profile:
//!
//! ```text
//!  v ▲
//!    │     ┌───────────────┐          ramp:    s = a/2 · t²
//!    │    /                 \         cruise:  s = d_ramp + v · (t - t_ramp)
//!    │   /                   \        decel:   mirror of the ramp from the row end
//!    └──┴─────────────────────┴──► s
//!       0   d_ramp      L - d_ramp  L
//! ```
//!
//! Rows too short to reach the scan speed get a triangular profile with
//! peak speed `sqrt(a · L)`.

use super::error::{FluenceError, Result};

/// Default stage acceleration in mm/s².
pub const DEFAULT_SCAN_ACCEL: f64 = 2500.0;

/// Trapezoidal velocity profile over a row of fixed length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapezoidProfile {
    length: f64,
    accel: f64,
    peak_speed: f64,
    ramp_time: f64,
    ramp_distance: f64,
    total_time: f64,
}

impl TrapezoidProfile {
    /// Builds the profile for a move of `length` mm at `speed` mm/s with
    /// acceleration `accel` mm/s².
    pub fn new(length: f64, speed: f64, accel: f64) -> Result<Self> {
        if !(speed.is_finite() && speed > 0.0 && accel.is_finite() && accel > 0.0) {
            return Err(FluenceError::InvalidKinematics { speed, accel });
        }
        if !(length.is_finite() && length >= 0.0) {
            return Err(FluenceError::InvalidBins(format!(
                "row length must be finite and non-negative, got {length}"
            )));
        }

        // s = v² / 2a to reach scan speed; clamp to half the row when it overlaps
        let full_ramp = speed * speed / (2.0 * accel);
        let (peak_speed, ramp_distance) = if 2.0 * full_ramp > length {
            ((accel * length).sqrt(), length / 2.0)
        } else {
            (speed, full_ramp)
        };

        let ramp_time = peak_speed / accel;
        let cruise_time = if peak_speed > 0.0 {
            (length - 2.0 * ramp_distance) / peak_speed
        } else {
            0.0
        };

        Ok(Self {
            length,
            accel,
            peak_speed,
            ramp_time,
            ramp_distance,
            total_time: 2.0 * ramp_time + cruise_time,
        })
    }

    /// Row length in mm.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Highest speed actually reached in mm/s.
    pub fn peak_speed(&self) -> f64 {
        self.peak_speed
    }

    /// Distance covered while accelerating (and again while decelerating).
    pub fn ramp_distance(&self) -> f64 {
        self.ramp_distance
    }

    /// Duration of one ramp in seconds.
    pub fn ramp_time(&self) -> f64 {
        self.ramp_time
    }

    /// Duration of the whole move in seconds.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Whether the row is too short to reach the requested speed.
    pub fn is_triangular(&self) -> bool {
        2.0 * self.ramp_distance >= self.length && self.length > 0.0
    }

    /// Time at which the stage passes `distance` mm from the row start.
    pub fn time_at(&self, distance: f64) -> f64 {
        let s = distance.clamp(0.0, self.length);
        if s <= self.ramp_distance {
            (2.0 * s / self.accel).sqrt()
        } else if s <= self.length - self.ramp_distance {
            self.ramp_time + (s - self.ramp_distance) / self.peak_speed
        } else {
            self.total_time - (2.0 * (self.length - s) / self.accel).sqrt()
        }
    }
}

/// Time spent above each bin of a row.
///
/// `bin_edges` must be strictly increasing; the row runs from the first to
/// the last edge. Returns one duration per bin in seconds, in the order of
/// the edges.
pub fn compute_bin_transit_times(bin_edges: &[f64], scan_speed: f64, scan_accel: f64) -> Result<Vec<f64>> {
    let mut times = Vec::with_capacity(bin_edges.len().saturating_sub(1));
    compute_bin_transit_times_into(bin_edges, scan_speed, scan_accel, &mut times)?;
    Ok(times)
}

/// Buffer-reusing variant of [`compute_bin_transit_times`].
///
/// `out` is cleared and refilled.
pub fn compute_bin_transit_times_into(
    bin_edges: &[f64],
    scan_speed: f64,
    scan_accel: f64,
    out: &mut Vec<f64>,
) -> Result<()> {
    validate_edges(bin_edges)?;

    let origin = bin_edges[0];
    let length = bin_edges[bin_edges.len() - 1] - origin;
    let profile = TrapezoidProfile::new(length, scan_speed, scan_accel)?;

    out.clear();
    let mut previous = 0.0;
    for edge in &bin_edges[1..] {
        let t = profile.time_at(edge - origin);
        out.push(t - previous);
        previous = t;
    }
    Ok(())
}

fn validate_edges(bin_edges: &[f64]) -> Result<()> {
    if bin_edges.len() < 2 {
        return Err(FluenceError::InvalidBins(format!(
            "need at least two bin edges, got {}",
            bin_edges.len()
        )));
    }
    if let Some(i) = bin_edges
        .windows(2)
        .position(|w| !(w[1] > w[0]) || !w[1].is_finite() || !w[0].is_finite())
    {
        return Err(FluenceError::InvalidBins(format!(
            "bin edges must be strictly increasing (edge {} -> {})",
            i,
            i + 1
        )));
    }
    Ok(())
}
