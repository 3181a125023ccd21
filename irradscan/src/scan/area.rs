//! Scan area geometry and row table.

use serde::{Deserialize, Serialize};

use super::error::{Result, ScanError};
use crate::stage::Position;

/// Relative tolerance when flooring the row count, so exact multiples of
/// the step size are not lost to rounding.
const ROW_COUNT_TOLERANCE: f64 = 1e-9;

/// Rectangular area scanned row by row.
///
/// Rows run along x at fixed y. Row 0 lies on `start_pos.y`; further rows
/// step towards `end_pos.y` by `step_size`. All coordinates are absolute
/// stage positions in mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanArea {
    /// Stage position when the area was prepared; the stage returns here.
    pub origin: Position,
    /// Corner where the first row starts.
    pub start_pos: Position,
    /// Opposite corner.
    pub end_pos: Position,
    /// Row pitch in mm.
    pub step_size: f64,
    /// Scan speed along x in mm/s.
    pub scan_speed: f64,
    rows: Vec<f64>,
}

impl ScanArea {
    /// Builds an area from corners given relative to `origin`.
    pub fn from_relative(
        origin: Position,
        rel_start: Position,
        rel_end: Position,
        scan_speed: f64,
        step_size: f64,
    ) -> Result<Self> {
        Self::new(
            origin,
            Position::new(origin.x + rel_start.x, origin.y + rel_start.y),
            Position::new(origin.x + rel_end.x, origin.y + rel_end.y),
            scan_speed,
            step_size,
        )
    }

    /// Builds an area from absolute corners.
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidGeometry`] if the corners coincide, the area has
    ///   no width, the step is not positive, or no full row fits
    /// - [`ScanError::InvalidScanSpeed`] if the speed is not positive
    pub fn new(
        origin: Position,
        start_pos: Position,
        end_pos: Position,
        scan_speed: f64,
        step_size: f64,
    ) -> Result<Self> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(ScanError::InvalidGeometry(format!(
                "step size must be positive, got {step_size}"
            )));
        }
        if !(scan_speed.is_finite() && scan_speed > 0.0) {
            return Err(ScanError::InvalidScanSpeed(scan_speed));
        }
        if start_pos == end_pos {
            return Err(ScanError::InvalidGeometry(
                "end point coincides with start point".to_string(),
            ));
        }

        let width = (end_pos.x - start_pos.x).abs();
        let height = (end_pos.y - start_pos.y).abs();
        if !(width.is_finite() && height.is_finite()) || width == 0.0 {
            return Err(ScanError::InvalidGeometry(format!(
                "scan area has no width ({width} mm x {height} mm)"
            )));
        }

        let n_rows = row_count(height, step_size);
        if n_rows == 0 {
            return Err(ScanError::InvalidGeometry(format!(
                "height {height} mm is smaller than step size {step_size} mm"
            )));
        }

        let direction = if end_pos.y >= start_pos.y { 1.0 } else { -1.0 };
        let rows = (0..n_rows)
            .map(|row| start_pos.y + direction * row as f64 * step_size)
            .collect();

        Ok(Self {
            origin,
            start_pos,
            end_pos,
            step_size,
            scan_speed,
            rows,
        })
    }

    /// Number of rows per sweep.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Absolute y position of every row, indexed by row.
    pub fn rows(&self) -> &[f64] {
        &self.rows
    }

    /// Absolute y position of a row.
    pub fn row_y(&self, row: usize) -> Option<f64> {
        self.rows.get(row).copied()
    }

    /// Extent along x in mm.
    pub fn width(&self) -> f64 {
        (self.end_pos.x - self.start_pos.x).abs()
    }

    /// Extent along y in mm.
    pub fn height(&self) -> f64 {
        (self.end_pos.y - self.start_pos.y).abs()
    }

    /// Distance of an absolute x position from the start edge, measured
    /// towards the end edge.
    pub fn relative_x(&self, x: f64) -> f64 {
        if self.end_pos.x >= self.start_pos.x {
            x - self.start_pos.x
        } else {
            self.start_pos.x - x
        }
    }

    /// Distance of an absolute y position from the first row, measured
    /// towards the last row.
    pub fn relative_y(&self, y: f64) -> f64 {
        if self.end_pos.y >= self.start_pos.y {
            y - self.start_pos.y
        } else {
            self.start_pos.y - y
        }
    }

    /// Row order of a sweep: ascending on even sweeps, descending on odd.
    pub fn sweep_rows(&self, sweep: u32) -> Box<dyn Iterator<Item = usize>> {
        let n = self.n_rows();
        if sweep % 2 == 0 {
            Box::new(0..n)
        } else {
            Box::new((0..n).rev())
        }
    }
}

fn row_count(height: f64, step_size: f64) -> usize {
    let ratio = height / step_size;
    (ratio * (1.0 + ROW_COUNT_TOLERANCE)).floor() as usize
}
