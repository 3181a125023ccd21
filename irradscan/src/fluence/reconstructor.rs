//! Row-by-row fluence reconstruction.
//!
//! # Architecture
//!
//! ```text
//!  RowEvent ──┐
//!             ▼
//!  ┌───────────────────────────┐   wait window   ┌───────────────────────┐
//!  │ lookup (cursor or binary  │ ──────────────► │ wait deposit at the   │
//!  │ search in BeamSampleStream│                 │ row's starting edge   │
//!  └───────────────────────────┘   scan window   ├───────────────────────┤
//!             │               ───────────────►   │ per-bin deposits from │──► FluenceAccumulator
//!             ▼                                  │ transit times + interp│
//!  compute_bin_transit_times ──────────────────► └───────────────────────┘
//! ```
//!
//! Per row:
//!
//! 1. **Wait phase** (all rows but the first): the samples taken between the
//!    previous row's stop and this row's start are integrated pairwise and
//!    deposited as one Gaussian at the x-edge where this row starts.
//! 2. **Scan phase**: transit times per x bin come from the trapezoidal
//!    profile at the row's scan speed. The difference between the measured
//!    row duration and the summed transit times is split evenly between the
//!    row start and end. The current is interpolated at each bin's center
//!    time and integrated over the bin's transit time.
//!
//! The map is scaled from particles/mm² to particles/cm² when finished.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::accumulator::{FluenceAccumulator, FluenceGrid};
use super::beam::{scan_current_at, BeamSample, BeamSampleStream, RowWindow};
use super::error::{FluenceError, OrderingViolation, Result};
use super::kernel::KernelParams;
use super::kinematics::{compute_bin_transit_times_into, DEFAULT_SCAN_ACCEL};
use super::map::{FluenceMap, DEFAULT_HARDNESS_FACTOR};
use crate::scan::{RowEvent, ScanArea};
use crate::telemetry::{TelemetryEvent, TelemetryPublisher};
use crate::units::ELEMENTARY_CHARGE;

/// Default map binning as `(x, y)`.
pub const DEFAULT_BINS: (usize, usize) = (200, 200);

/// Minimum x travel for a row's direction to be read from its positions.
const DIRECTION_EPSILON_MM: f64 = 1e-9;

/// How the scan direction of a row is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// From the row's recorded `x_start`/`x_stop`; row parity when they
    /// coincide.
    #[default]
    Recorded,
    /// Odd rows run from the far edge, even rows from the start edge.
    RowParity,
}

/// How beam samples are located for each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// One forward-only cursor over the whole stream.
    #[default]
    Cursor,
    /// Independent binary search per row.
    BinarySearch,
}

/// Settings for one reconstruction run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionConfig {
    /// Map binning as `(x, y)`.
    pub bins: (usize, usize),
    /// Beam-spot kernel.
    pub kernel: KernelParams,
    /// Stage acceleration in mm/s².
    pub scan_accel: f64,
    /// Scan direction policy.
    pub direction: DirectionPolicy,
    /// Beam sample lookup.
    pub lookup: LookupStrategy,
    /// Neutron-equivalence factor carried into the map.
    pub hardness_factor: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            kernel: KernelParams::default(),
            scan_accel: DEFAULT_SCAN_ACCEL,
            direction: DirectionPolicy::default(),
            lookup: LookupStrategy::default(),
            hardness_factor: DEFAULT_HARDNESS_FACTOR,
        }
    }
}

impl ReconstructionConfig {
    /// Sets the binning as `(x, y)`.
    pub fn with_bins(mut self, bins_x: usize, bins_y: usize) -> Self {
        self.bins = (bins_x, bins_y);
        self
    }

    /// Sets the kernel.
    pub fn with_kernel(mut self, kernel: KernelParams) -> Self {
        self.kernel = kernel;
        self
    }

    /// Sets the stage acceleration in mm/s².
    pub fn with_scan_accel(mut self, scan_accel: f64) -> Self {
        self.scan_accel = scan_accel;
        self
    }

    /// Sets the direction policy.
    pub fn with_direction(mut self, direction: DirectionPolicy) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the lookup strategy.
    pub fn with_lookup(mut self, lookup: LookupStrategy) -> Self {
        self.lookup = lookup;
        self
    }

    /// Sets the hardness factor.
    pub fn with_hardness_factor(mut self, hardness_factor: f64) -> Self {
        self.hardness_factor = hardness_factor;
        self
    }
}

/// Particles attributed to one processed row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowDeposit {
    /// Row index within the scan area.
    pub row_index: usize,
    /// Particles deposited while waiting before the row.
    pub wait_particles: f64,
    /// Particles deposited while scanning the row.
    pub scan_particles: f64,
    /// Communication overhead assumed at each end of the row, in seconds.
    pub overhead: f64,
    /// Whether the row ran from the far edge towards the start edge.
    pub reversed: bool,
}

impl RowDeposit {
    /// Total particles of the row.
    pub fn particles(&self) -> f64 {
        self.wait_particles + self.scan_particles
    }
}

/// Incremental reconstruction over rows in time order.
///
/// Rows may be fed as they are scanned, as long as the beam stream passed to
/// [`process_row`](Self::process_row) already covers the row's stop time.
#[derive(Debug)]
pub struct FluenceReconstructor {
    area: ScanArea,
    config: ReconstructionConfig,
    grid: FluenceGrid,
    accumulator: FluenceAccumulator,
    transit: Vec<f64>,
    beam_position: usize,
    previous_stop: Option<f64>,
    rows_processed: usize,
    publisher: Option<TelemetryPublisher>,
}

impl FluenceReconstructor {
    /// Creates a reconstructor over the full extent of `area`.
    ///
    /// # Errors
    ///
    /// Configuration errors surface here, before any row is processed.
    pub fn new(area: &ScanArea, config: ReconstructionConfig) -> Result<Self> {
        if !(config.scan_accel.is_finite() && config.scan_accel > 0.0) {
            return Err(FluenceError::InvalidKinematics {
                speed: area.scan_speed,
                accel: config.scan_accel,
            });
        }
        let grid = FluenceGrid::new(area.width(), area.height(), config.bins.0, config.bins.1)?;
        let accumulator = FluenceAccumulator::new(grid.clone(), config.kernel);

        Ok(Self {
            area: area.clone(),
            transit: Vec::with_capacity(config.bins.0),
            config,
            grid,
            accumulator,
            beam_position: 0,
            previous_stop: None,
            rows_processed: 0,
            publisher: None,
        })
    }

    /// Publishes `fluence_row` for every processed row.
    pub fn with_publisher(mut self, publisher: TelemetryPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run settings.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Accumulated state so far.
    pub fn accumulator(&self) -> &FluenceAccumulator {
        &self.accumulator
    }

    /// Number of rows processed.
    pub fn rows_processed(&self) -> usize {
        self.rows_processed
    }

    /// Deposits one row.
    ///
    /// # Errors
    ///
    /// - [`FluenceError::StreamOrderingViolation`] if the row stops before it
    ///   starts or starts before the previous row stopped
    /// - [`FluenceError::InvalidKinematics`] if the row's scan speed is not
    ///   positive
    pub fn process_row(&mut self, row: &RowEvent, beam: &BeamSampleStream) -> Result<RowDeposit> {
        check_row(self.rows_processed, row, self.previous_stop)?;

        let (window, next_position) = match self.config.lookup {
            LookupStrategy::Cursor => {
                let mut cursor = beam.cursor_at(self.beam_position);
                let window = cursor.next_row(row.start_timestamp, row.stop_timestamp);
                (window, cursor.position())
            }
            LookupStrategy::BinarySearch => (
                beam.row_window(self.previous_stop, row.start_timestamp, row.stop_timestamp),
                self.beam_position,
            ),
        };

        let deposit = deposit_row(
            &mut self.accumulator,
            &self.grid,
            &self.area,
            &self.config,
            row,
            self.rows_processed == 0,
            window,
            beam.samples(),
            &mut self.transit,
        )?;

        self.beam_position = next_position;
        self.previous_stop = Some(row.stop_timestamp);
        self.rows_processed += 1;

        debug!(
            row = row.row_index,
            wait_particles = deposit.wait_particles,
            scan_particles = deposit.scan_particles,
            overhead_s = deposit.overhead,
            reversed = deposit.reversed,
            "Row reconstructed"
        );
        if let Some(publisher) = &self.publisher {
            publisher.publish_as(
                "fluence",
                TelemetryEvent::FluenceRow {
                    row: row.row_index,
                    particles: deposit.particles(),
                },
            );
        }
        Ok(deposit)
    }

    /// Finalizes the map.
    pub fn finish(self) -> FluenceMap {
        FluenceMap::from_accumulator(self.accumulator, self.config.hardness_factor)
    }
}

// =============================================================================
// Batch entry points
// =============================================================================

/// Reconstructs a map with default settings apart from kernel and binning.
pub fn reconstruct(
    rows: &[RowEvent],
    beam: &BeamSampleStream,
    area: &ScanArea,
    kernel: KernelParams,
    bins: (usize, usize),
) -> Result<FluenceMap> {
    let config = ReconstructionConfig::default()
        .with_kernel(kernel)
        .with_bins(bins.0, bins.1);
    reconstruct_with(rows, beam, area, &config)
}

/// Reconstructs a map sequentially.
pub fn reconstruct_with(
    rows: &[RowEvent],
    beam: &BeamSampleStream,
    area: &ScanArea,
    config: &ReconstructionConfig,
) -> Result<FluenceMap> {
    let mut reconstructor = FluenceReconstructor::new(area, config.clone())?;
    for row in rows {
        reconstructor.process_row(row, beam)?;
    }
    Ok(reconstructor.finish())
}

/// Reconstructs a map with rows spread over the rayon thread pool.
///
/// Each row locates its samples by binary search, so the result equals the
/// sequential one up to floating-point summation order.
pub fn reconstruct_parallel(
    rows: &[RowEvent],
    beam: &BeamSampleStream,
    area: &ScanArea,
    config: &ReconstructionConfig,
) -> Result<FluenceMap> {
    let base = FluenceReconstructor::new(area, config.clone())?;
    check_rows(rows)?;

    let grid = &base.grid;
    let merged = rows
        .par_iter()
        .enumerate()
        .try_fold(
            || (FluenceAccumulator::new(grid.clone(), config.kernel), Vec::new()),
            |(mut accumulator, mut transit), (index, row)| {
                let previous_stop = index.checked_sub(1).map(|p| rows[p].stop_timestamp);
                let window =
                    beam.row_window(previous_stop, row.start_timestamp, row.stop_timestamp);
                deposit_row(
                    &mut accumulator,
                    grid,
                    area,
                    config,
                    row,
                    index == 0,
                    window,
                    beam.samples(),
                    &mut transit,
                )?;
                Ok((accumulator, transit))
            },
        )
        .map(|partial| partial.map(|(accumulator, _)| accumulator))
        .try_reduce_with(|mut left, right| {
            left.merge(&right)?;
            Ok(left)
        });

    trace!(rows = rows.len(), "Parallel reconstruction merged");
    match merged {
        Some(accumulator) => Ok(FluenceMap::from_accumulator(
            accumulator?,
            config.hardness_factor,
        )),
        None => Ok(base.finish()),
    }
}

// =============================================================================
// Row processing
// =============================================================================

fn check_row(position: usize, row: &RowEvent, previous_stop: Option<f64>) -> Result<()> {
    let start = row.start_timestamp;
    let stop = row.stop_timestamp;
    if !(start.is_finite() && stop.is_finite()) || stop < start {
        return Err(FluenceError::StreamOrderingViolation(
            OrderingViolation::RowInterval {
                position,
                row: row.row_index,
                start,
                stop,
            },
        ));
    }
    if let Some(previous_stop) = previous_stop {
        if start < previous_stop {
            return Err(FluenceError::StreamOrderingViolation(
                OrderingViolation::RowSequence {
                    position,
                    row: row.row_index,
                    start,
                    previous_stop,
                },
            ));
        }
    }
    Ok(())
}

fn check_rows(rows: &[RowEvent]) -> Result<()> {
    let mut previous_stop = None;
    for (position, row) in rows.iter().enumerate() {
        check_row(position, row, previous_stop)?;
        previous_stop = Some(row.stop_timestamp);
    }
    Ok(())
}

fn is_reversed(policy: DirectionPolicy, area: &ScanArea, row: &RowEvent) -> bool {
    let parity = row.row_index % 2 == 1;
    match policy {
        DirectionPolicy::RowParity => parity,
        DirectionPolicy::Recorded => {
            let travel = area.relative_x(row.x_stop) - area.relative_x(row.x_start);
            if travel.abs() > DIRECTION_EPSILON_MM {
                travel < 0.0
            } else {
                parity
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn deposit_row(
    accumulator: &mut FluenceAccumulator,
    grid: &FluenceGrid,
    area: &ScanArea,
    config: &ReconstructionConfig,
    row: &RowEvent,
    first: bool,
    window: RowWindow<'_>,
    stream: &[BeamSample],
    transit: &mut Vec<f64>,
) -> Result<RowDeposit> {
    // Validates the speed before anything is deposited
    compute_bin_transit_times_into(grid.edges_x(), row.scan_speed, config.scan_accel, transit)?;

    let reversed = is_reversed(config.direction, area, row);
    let mu_y = area.relative_y(row.y_start);

    let mut wait_particles = 0.0;
    if !first && window.wait.len() >= 2 {
        wait_particles = window
            .wait
            .windows(2)
            .map(|pair| pair[0].current * (pair[1].timestamp - pair[0].timestamp) / ELEMENTARY_CHARGE)
            .sum();
        let edges = grid.edges_x();
        let wait_x = if reversed {
            edges[edges.len() - 1]
        } else {
            edges[0]
        };
        accumulator.deposit(wait_x, mu_y, wait_particles);
    }

    let transit_total: f64 = transit.iter().sum();
    let overhead = (row.duration() - transit_total) / 2.0;
    let scan_start = row.start_timestamp + overhead;
    if overhead < 0.0 {
        trace!(
            row = row.row_index,
            overhead_s = overhead,
            "Row shorter than its kinematic transit time"
        );
    }

    let centers = grid.centers_x();
    let n = transit.len();
    let mut elapsed = 0.0;
    let mut scan_particles = 0.0;
    for (i, dt) in transit.iter().enumerate() {
        elapsed += dt;
        let center_time = scan_start + elapsed - dt / 2.0;
        let current = scan_current_at(window.scan, stream, center_time);
        let particles = current * dt / ELEMENTARY_CHARGE;
        let mu_x = centers[if reversed { n - 1 - i } else { i }];
        accumulator.deposit(mu_x, mu_y, particles);
        scan_particles += particles;
    }

    Ok(RowDeposit {
        row_index: row.row_index,
        wait_particles,
        scan_particles,
        overhead,
        reversed,
    })
}
