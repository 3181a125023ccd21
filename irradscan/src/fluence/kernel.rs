//! Bivariate Gaussian beam-spot kernel.

use serde::{Deserialize, Serialize};

use super::error::{FluenceError, Result};

/// Smallest accepted kernel cutoff in standard deviations.
pub const MIN_SKIP_SIGMAS: f64 = 3.0;

/// Default kernel cutoff in standard deviations.
pub const DEFAULT_SKIP_SIGMAS: f64 = 6.0;

/// Default beam sigma along x in mm.
pub const DEFAULT_SIGMA_X: f64 = 2.01;

/// Default beam sigma along y in mm.
pub const DEFAULT_SIGMA_Y: f64 = 1.37;

/// Beam-spot shape and cutoff for one reconstruction run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    sigma_x: f64,
    sigma_y: f64,
    skip_sigmas: f64,
}

impl KernelParams {
    /// Validates and creates kernel parameters.
    ///
    /// # Errors
    ///
    /// - [`FluenceError::InvalidSigma`] if a sigma is not positive and finite
    /// - [`FluenceError::InvalidKernelConfig`] if `skip_sigmas` is below
    ///   [`MIN_SKIP_SIGMAS`]
    pub fn new(sigma_x: f64, sigma_y: f64, skip_sigmas: f64) -> Result<Self> {
        if !(sigma_x.is_finite() && sigma_x > 0.0 && sigma_y.is_finite() && sigma_y > 0.0) {
            return Err(FluenceError::InvalidSigma { sigma_x, sigma_y });
        }
        // NaN fails this comparison too
        if !(skip_sigmas >= MIN_SKIP_SIGMAS) {
            return Err(FluenceError::InvalidKernelConfig {
                skip_sigmas,
                min: MIN_SKIP_SIGMAS,
            });
        }
        Ok(Self {
            sigma_x,
            sigma_y,
            skip_sigmas,
        })
    }

    /// Kernel with the default cutoff.
    pub fn from_sigma(sigma_x: f64, sigma_y: f64) -> Result<Self> {
        Self::new(sigma_x, sigma_y, DEFAULT_SKIP_SIGMAS)
    }

    /// Beam sigma along x in mm.
    pub fn sigma_x(&self) -> f64 {
        self.sigma_x
    }

    /// Beam sigma along y in mm.
    pub fn sigma_y(&self) -> f64 {
        self.sigma_y
    }

    /// Cutoff in standard deviations.
    pub fn skip_sigmas(&self) -> f64 {
        self.skip_sigmas
    }

    /// Cutoff distance along x in mm.
    pub fn reach_x(&self) -> f64 {
        self.skip_sigmas * self.sigma_x
    }

    /// Cutoff distance along y in mm.
    pub fn reach_y(&self) -> f64 {
        self.skip_sigmas * self.sigma_y
    }
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            sigma_x: DEFAULT_SIGMA_X,
            sigma_y: DEFAULT_SIGMA_Y,
            skip_sigmas: DEFAULT_SKIP_SIGMAS,
        }
    }
}

/// Density of an axis-aligned bivariate Gaussian at `(x, y)`.
///
/// With `normalized == false` the `amplitude` is the integral of the
/// distribution and is scaled by [`gauss_2d_norm`]; otherwise it is used as
/// the peak value directly.
#[allow(clippy::too_many_arguments)]
pub fn gauss_2d_pdf(
    x: f64,
    y: f64,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
    amplitude: f64,
    normalized: bool,
) -> f64 {
    let peak = if normalized {
        amplitude
    } else {
        gauss_2d_norm(amplitude, sigma_x, sigma_y)
    };
    let dx = (x - mu_x) / sigma_x;
    let dy = (y - mu_y) / sigma_y;
    peak * (-0.5 * (dx * dx + dy * dy)).exp()
}

/// Integral of a bivariate Gaussian with peak value `amplitude`.
pub fn gauss_2d_volume(amplitude: f64, sigma_x: f64, sigma_y: f64) -> f64 {
    amplitude * 2.0 * std::f64::consts::PI * sigma_x * sigma_y
}

/// Peak value of a bivariate Gaussian whose integral is `amplitude`.
pub fn gauss_2d_norm(amplitude: f64, sigma_x: f64, sigma_y: f64) -> f64 {
    amplitude / (2.0 * std::f64::consts::PI * sigma_x * sigma_y)
}

/// One-dimensional Gaussian factor `exp(-d² / 2σ²)`.
#[inline]
pub(crate) fn gauss_factor(distance: f64, sigma: f64) -> f64 {
    let d = distance / sigma;
    (-0.5 * d * d).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_tight_cutoff() {
        assert!(matches!(
            KernelParams::new(2.0, 1.5, 2.0),
            Err(FluenceError::InvalidKernelConfig { .. })
        ));
        assert!(matches!(
            KernelParams::new(2.0, 1.5, f64::NAN),
            Err(FluenceError::InvalidKernelConfig { .. })
        ));
        assert!(KernelParams::new(2.0, 1.5, 3.0).is_ok());
    }

    #[test]
    fn test_rejects_bad_sigma() {
        assert!(matches!(
            KernelParams::from_sigma(0.0, 1.0),
            Err(FluenceError::InvalidSigma { .. })
        ));
        assert!(matches!(
            KernelParams::from_sigma(1.0, -1.0),
            Err(FluenceError::InvalidSigma { .. })
        ));
    }

    #[test]
    fn test_pdf_peak() {
        let peak = gauss_2d_pdf(1.0, 2.0, 1.0, 2.0, 2.0, 1.5, 10.0, false);
        assert!((peak - gauss_2d_norm(10.0, 2.0, 1.5)).abs() < 1e-15);

        let raw = gauss_2d_pdf(1.0, 2.0, 1.0, 2.0, 2.0, 1.5, 10.0, true);
        assert_eq!(raw, 10.0);
    }

    #[test]
    fn test_pdf_one_sigma() {
        let v = gauss_2d_pdf(2.0, 0.0, 0.0, 0.0, 2.0, 1.0, 1.0, true);
        assert!((v - (-0.5f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn test_numeric_integral_matches_amplitude() {
        // Riemann sum over ±8σ on a fine grid
        let (sx, sy, amp) = (2.0, 1.5, 1e6);
        let step = 0.05;
        let mut total = 0.0;
        let mut y = -12.0;
        while y <= 12.0 {
            let mut x = -16.0;
            while x <= 16.0 {
                total += gauss_2d_pdf(x, y, 0.0, 0.0, sx, sy, amp, false) * step * step;
                x += step;
            }
            y += step;
        }
        assert!((total - amp).abs() / amp < 1e-3);
    }

    proptest! {
        #[test]
        fn prop_volume_inverts_norm(
            amplitude in 1e-3f64..1e15,
            sigma_x in 1e-3f64..100.0,
            sigma_y in 1e-3f64..100.0,
        ) {
            let back = gauss_2d_volume(gauss_2d_norm(amplitude, sigma_x, sigma_y), sigma_x, sigma_y);
            prop_assert!((back - amplitude).abs() <= 1e-12 * amplitude);
        }
    }
}
