//! Fluence grid and Gaussian deposition.
//!
//! Values are particle densities in particles/mm². A deposit of `N`
//! particles adds the Gaussian density of integral `N` to every cell whose
//! center lies within `skip_sigmas` standard deviations of the beam center
//! along both axes. The kernel is separable, so a deposit evaluates one
//! factor per covered column and one per covered row:
//!
//! ```text
//!            wx[i0..i1]
//!          ┌───────────┐
//!  wy[j0]  │ · · · · · │   values[j, i] += peak · wy[j] · wx[i]
//!    ...   │ · · ● · · │
//!  wy[j1]  │ · · · · · │
//!          └───────────┘
//! ```

use ndarray::{s, Array2};

use super::error::{FluenceError, Result};
use super::kernel::{gauss_2d_norm, gauss_factor, KernelParams};

/// Bin geometry of a fluence map in mm, relative to the scan area corner.
#[derive(Debug, Clone, PartialEq)]
pub struct FluenceGrid {
    edges_x: Vec<f64>,
    edges_y: Vec<f64>,
    centers_x: Vec<f64>,
    centers_y: Vec<f64>,
}

impl FluenceGrid {
    /// Uniform grid over `[0, width] x [0, height]`.
    pub fn new(width: f64, height: f64, bins_x: usize, bins_y: usize) -> Result<Self> {
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(FluenceError::EmptyScan { width, height });
        }
        if bins_x == 0 || bins_y == 0 {
            return Err(FluenceError::InvalidBins(format!(
                "bin counts must be positive, got ({bins_x}, {bins_y})"
            )));
        }
        Self::from_edges(linspace(width, bins_x), linspace(height, bins_y))
    }

    /// Grid from explicit, strictly increasing bin edges.
    pub fn from_edges(edges_x: Vec<f64>, edges_y: Vec<f64>) -> Result<Self> {
        validate_edges("x", &edges_x)?;
        validate_edges("y", &edges_y)?;
        Ok(Self {
            centers_x: centers(&edges_x),
            centers_y: centers(&edges_y),
            edges_x,
            edges_y,
        })
    }

    /// Bin edges along x.
    pub fn edges_x(&self) -> &[f64] {
        &self.edges_x
    }

    /// Bin edges along y.
    pub fn edges_y(&self) -> &[f64] {
        &self.edges_y
    }

    /// Bin centers along x.
    pub fn centers_x(&self) -> &[f64] {
        &self.centers_x
    }

    /// Bin centers along y.
    pub fn centers_y(&self) -> &[f64] {
        &self.centers_y
    }

    /// Number of bins as `(x, y)`.
    pub fn bins(&self) -> (usize, usize) {
        (self.centers_x.len(), self.centers_y.len())
    }

    /// Area of one cell in mm².
    pub fn cell_area(&self, ix: usize, iy: usize) -> f64 {
        (self.edges_x[ix + 1] - self.edges_x[ix]) * (self.edges_y[iy + 1] - self.edges_y[iy])
    }
}

fn linspace(stop: f64, bins: usize) -> Vec<f64> {
    (0..=bins).map(|i| stop * i as f64 / bins as f64).collect()
}

fn centers(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

fn validate_edges(axis: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(FluenceError::InvalidBins(format!(
            "{axis}: need at least two bin edges"
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(FluenceError::InvalidBins(format!(
            "{axis}: bin edges must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Mutable fluence grid receiving Gaussian deposits.
#[derive(Debug, Clone)]
pub struct FluenceAccumulator {
    grid: FluenceGrid,
    kernel: KernelParams,
    /// Shape `[bins_y, bins_x]`.
    values: Array2<f64>,
    deposited: f64,
    deposits: u64,
    weights_x: Vec<f64>,
    weights_y: Vec<f64>,
}

impl FluenceAccumulator {
    /// Creates an all-zero accumulator.
    pub fn new(grid: FluenceGrid, kernel: KernelParams) -> Self {
        let (nx, ny) = grid.bins();
        Self {
            values: Array2::zeros((ny, nx)),
            grid,
            kernel,
            deposited: 0.0,
            deposits: 0,
            weights_x: Vec::with_capacity(nx),
            weights_y: Vec::with_capacity(ny),
        }
    }

    /// Grid geometry.
    pub fn grid(&self) -> &FluenceGrid {
        &self.grid
    }

    /// Kernel in use.
    pub fn kernel(&self) -> &KernelParams {
        &self.kernel
    }

    /// Accumulated densities in particles/mm², shape `[bins_y, bins_x]`.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Sum of all deposited particle counts, before the kernel cutoff.
    pub fn deposited_particles(&self) -> f64 {
        self.deposited
    }

    /// Number of deposit calls.
    pub fn deposit_count(&self) -> u64 {
        self.deposits
    }

    /// Particles actually held by the grid (density times cell area).
    pub fn integral(&self) -> f64 {
        self.values
            .indexed_iter()
            .map(|((iy, ix), v)| v * self.grid.cell_area(ix, iy))
            .sum()
    }

    /// Replaces the kernel.
    ///
    /// The new parameters are validated first; on error the accumulator,
    /// including its values, is left unchanged.
    pub fn reconfigure(&mut self, sigma_x: f64, sigma_y: f64, skip_sigmas: f64) -> Result<()> {
        self.kernel = KernelParams::new(sigma_x, sigma_y, skip_sigmas)?;
        Ok(())
    }

    /// Clears every value and counter.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.deposited = 0.0;
        self.deposits = 0;
    }

    /// Deposits `particles` as a Gaussian centered at `(mu_x, mu_y)`.
    pub fn deposit(&mut self, mu_x: f64, mu_y: f64, particles: f64) {
        let peak = gauss_2d_norm(particles, self.kernel.sigma_x(), self.kernel.sigma_y());
        self.deposited += particles;
        self.add_kernel(mu_x, mu_y, peak);
    }

    /// Deposits a Gaussian whose peak density is `peak`, with no
    /// normalization.
    pub fn deposit_normalized(&mut self, mu_x: f64, mu_y: f64, peak: f64) {
        self.deposited += peak * 2.0 * std::f64::consts::PI * self.kernel.sigma_x() * self.kernel.sigma_y();
        self.add_kernel(mu_x, mu_y, peak);
    }

    fn add_kernel(&mut self, mu_x: f64, mu_y: f64, peak: f64) {
        self.deposits += 1;
        if peak == 0.0 {
            return;
        }

        let Some((x0, x1)) = covered_range(&self.grid.centers_x, mu_x, self.kernel.reach_x()) else {
            return;
        };
        let Some((y0, y1)) = covered_range(&self.grid.centers_y, mu_y, self.kernel.reach_y()) else {
            return;
        };

        let sigma_x = self.kernel.sigma_x();
        let sigma_y = self.kernel.sigma_y();
        self.weights_x.clear();
        self.weights_x.extend(
            self.grid.centers_x[x0..x1]
                .iter()
                .map(|c| gauss_factor(c - mu_x, sigma_x)),
        );
        self.weights_y.clear();
        self.weights_y.extend(
            self.grid.centers_y[y0..y1]
                .iter()
                .map(|c| peak * gauss_factor(c - mu_y, sigma_y)),
        );

        let mut block = self.values.slice_mut(s![y0..y1, x0..x1]);
        for (mut row, wy) in block.rows_mut().into_iter().zip(&self.weights_y) {
            for (cell, wx) in row.iter_mut().zip(&self.weights_x) {
                *cell += wy * wx;
            }
        }
    }

    /// Adds the values and counters of another accumulator on the same grid.
    pub fn merge(&mut self, other: &FluenceAccumulator) -> Result<()> {
        if self.grid != other.grid {
            return Err(FluenceError::InvalidBins(
                "cannot merge accumulators with different grids".to_string(),
            ));
        }
        self.values += &other.values;
        self.deposited += other.deposited;
        self.deposits += other.deposits;
        Ok(())
    }

    /// Consumes the accumulator, returning grid, values and deposited particles.
    pub fn into_parts(self) -> (FluenceGrid, Array2<f64>, f64) {
        (self.grid, self.values, self.deposited)
    }
}

/// Index range of centers with `|c - mu| <= reach`; `None` when empty.
fn covered_range(centers: &[f64], mu: f64, reach: f64) -> Option<(usize, usize)> {
    let lo = centers.partition_point(|c| *c < mu - reach);
    let hi = centers.partition_point(|c| *c <= mu + reach);
    (hi > lo).then_some((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(bins: usize, skip: f64) -> FluenceAccumulator {
        let grid = FluenceGrid::new(40.0, 40.0, bins, bins).unwrap();
        FluenceAccumulator::new(grid, KernelParams::new(2.0, 1.5, skip).unwrap())
    }

    #[test]
    fn test_grid_geometry() {
        let grid = FluenceGrid::new(10.0, 5.0, 4, 2).unwrap();
        assert_eq!(grid.edges_x(), &[0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(grid.centers_y(), &[1.25, 3.75]);
        assert_eq!(grid.bins(), (4, 2));
        assert_eq!(grid.cell_area(0, 0), 2.5 * 2.5);
    }

    #[test]
    fn test_grid_rejects_empty_area() {
        assert!(matches!(
            FluenceGrid::new(0.0, 5.0, 4, 4),
            Err(FluenceError::EmptyScan { .. })
        ));
        assert!(matches!(
            FluenceGrid::new(5.0, 5.0, 0, 4),
            Err(FluenceError::InvalidBins(_))
        ));
        assert!(FluenceGrid::from_edges(vec![0.0, 1.0, 1.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_interior_deposit_conserves_particles() {
        let mut acc = accumulator(200, 6.0);
        acc.deposit(20.0, 20.0, 1e9);
        assert_eq!(acc.deposited_particles(), 1e9);
        let integral = acc.integral();
        assert!((integral - 1e9).abs() / 1e9 < 1e-3, "integral {integral}");
    }

    #[test]
    fn test_cutoff_limits_footprint() {
        let mut acc = accumulator(40, 3.0);
        acc.deposit(20.0, 20.0, 1.0);

        // 1 mm bins, centers at k + 0.5: 3σx = 6 mm covers 12 columns, 3σy = 4.5 mm covers 10 rows
        let touched = acc.values().iter().filter(|v| **v > 0.0).count();
        assert_eq!(touched, 12 * 10);
    }

    #[test]
    fn test_deposit_near_edge_loses_tail() {
        let mut acc = accumulator(200, 6.0);
        acc.deposit(0.0, 20.0, 1e6);
        let integral = acc.integral();
        assert!(integral < 0.55e6 && integral > 0.45e6);
    }

    #[test]
    fn test_deposit_outside_grid_is_ignored() {
        let mut acc = accumulator(20, 3.0);
        acc.deposit(500.0, 500.0, 1e6);
        assert_eq!(acc.integral(), 0.0);
        assert_eq!(acc.deposited_particles(), 1e6);
    }

    #[test]
    fn test_normalized_deposit_uses_peak() {
        let grid = FluenceGrid::new(2.0, 2.0, 2, 2).unwrap();
        let mut acc = FluenceAccumulator::new(grid, KernelParams::new(1.0, 1.0, 3.0).unwrap());
        acc.deposit_normalized(0.5, 0.5, 7.0);
        assert_eq!(acc.values()[[0, 0]], 7.0);
    }

    #[test]
    fn test_invalid_reconfigure_leaves_map_unchanged() {
        let mut acc = accumulator(50, 6.0);
        acc.deposit(20.0, 20.0, 1e6);
        let before = acc.values().clone();
        let kernel = *acc.kernel();

        let err = acc.reconfigure(2.0, 1.5, 2.0).unwrap_err();
        assert!(matches!(err, FluenceError::InvalidKernelConfig { .. }));
        assert_eq!(acc.values(), &before);
        assert_eq!(acc.kernel(), &kernel);
    }

    #[test]
    fn test_merge_adds_values() {
        let mut a = accumulator(20, 3.0);
        let mut b = accumulator(20, 3.0);
        a.deposit(10.0, 10.0, 1e3);
        b.deposit(30.0, 30.0, 2e3);
        a.merge(&b).unwrap();
        assert_eq!(a.deposited_particles(), 3e3);
        assert_eq!(a.deposit_count(), 2);

        let other_grid = FluenceAccumulator::new(
            FluenceGrid::new(10.0, 10.0, 20, 20).unwrap(),
            KernelParams::default(),
        );
        assert!(a.merge(&other_grid).is_err());
    }

    #[test]
    fn test_reset() {
        let mut acc = accumulator(10, 3.0);
        acc.deposit(20.0, 20.0, 5.0);
        acc.reset();
        assert_eq!(acc.integral(), 0.0);
        assert_eq!(acc.deposit_count(), 0);
    }
}
