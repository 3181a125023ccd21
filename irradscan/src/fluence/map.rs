//! Finalized fluence map.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::accumulator::FluenceAccumulator;
use crate::units::MM2_TO_CM2;

/// Default neutron-equivalence (hardness) factor.
pub const DEFAULT_HARDNESS_FACTOR: f64 = 1.0;

/// Reconstructed fluence in particles/cm².
///
/// Coordinates are in mm relative to the scan area corner. `values` has
/// shape `[bins_y, bins_x]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluenceMap {
    /// Bin edges along x in mm.
    pub bin_edges_x: Vec<f64>,
    /// Bin edges along y in mm.
    pub bin_edges_y: Vec<f64>,
    /// Bin centers along x in mm.
    pub bin_centers_x: Vec<f64>,
    /// Bin centers along y in mm.
    pub bin_centers_y: Vec<f64>,
    /// Fluence per bin in particles/cm².
    pub values: Array2<f64>,
    /// Particles deposited, before the kernel cutoff.
    pub deposited_particles: f64,
    /// Neutron-equivalence factor for display; not applied to `values`.
    pub hardness_factor: f64,
}

impl FluenceMap {
    /// Finalizes an accumulator, converting particles/mm² to particles/cm².
    pub fn from_accumulator(accumulator: FluenceAccumulator, hardness_factor: f64) -> Self {
        let (grid, values, deposited_particles) = accumulator.into_parts();
        Self {
            bin_edges_x: grid.edges_x().to_vec(),
            bin_edges_y: grid.edges_y().to_vec(),
            bin_centers_x: grid.centers_x().to_vec(),
            bin_centers_y: grid.centers_y().to_vec(),
            values: values * MM2_TO_CM2,
            deposited_particles,
            hardness_factor,
        }
    }

    /// Number of bins as `(x, y)`.
    pub fn bins(&self) -> (usize, usize) {
        (self.bin_centers_x.len(), self.bin_centers_y.len())
    }

    /// Particles held by the map (fluence times cell area).
    pub fn total_particles(&self) -> f64 {
        self.values
            .indexed_iter()
            .map(|((iy, ix), v)| {
                let area_mm2 = (self.bin_edges_x[ix + 1] - self.bin_edges_x[ix])
                    * (self.bin_edges_y[iy + 1] - self.bin_edges_y[iy]);
                v * area_mm2 / MM2_TO_CM2
            })
            .sum()
    }

    /// Largest bin value.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Mean bin value.
    pub fn mean(&self) -> f64 {
        self.values.mean().unwrap_or(0.0)
    }

    /// Standard deviation of the bin values.
    pub fn std_dev(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.std(0.0)
        }
    }

    /// Neutron-equivalent fluence in n_eq/cm².
    pub fn neq_values(&self) -> Array2<f64> {
        &self.values * self.hardness_factor
    }

    /// Writes the map as JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self).map_err(io::Error::other)
    }

    /// Reads a map written by [`save`](Self::save).
    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
