//! Reconstruction error types.

use std::fmt;

use thiserror::Error;

/// What was out of order when a [`FluenceError::StreamOrderingViolation`] fired.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderingViolation {
    /// A beam sample did not strictly follow its predecessor.
    BeamSample {
        /// Index of the offending sample in the stream.
        index: usize,
        /// Timestamp of the preceding sample.
        previous: f64,
        /// Timestamp of the offending sample.
        timestamp: f64,
    },

    /// A row stopped before it started.
    RowInterval {
        /// Position of the row in the reconstruction input.
        position: usize,
        /// Row index within the scan area.
        row: usize,
        /// Recorded start timestamp.
        start: f64,
        /// Recorded stop timestamp.
        stop: f64,
    },

    /// A row started before the previous row stopped.
    RowSequence {
        /// Position of the row in the reconstruction input.
        position: usize,
        /// Row index within the scan area.
        row: usize,
        /// Recorded start timestamp.
        start: f64,
        /// Stop timestamp of the preceding row.
        previous_stop: f64,
    },
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingViolation::BeamSample {
                index,
                previous,
                timestamp,
            } => write!(
                f,
                "beam sample {} at t={:.6} does not follow t={:.6}",
                index, timestamp, previous
            ),
            OrderingViolation::RowInterval {
                position,
                row,
                start,
                stop,
            } => write!(
                f,
                "row event {} (row {}) stops at t={:.6} before it starts at t={:.6}",
                position, row, stop, start
            ),
            OrderingViolation::RowSequence {
                position,
                row,
                start,
                previous_stop,
            } => write!(
                f,
                "row event {} (row {}) starts at t={:.6} before the previous row stopped at t={:.6}",
                position, row, start, previous_stop
            ),
        }
    }
}

/// Errors raised while configuring or running a fluence reconstruction.
#[derive(Debug, Error)]
pub enum FluenceError {
    /// The kernel cutoff is too tight to be accurate.
    #[error("invalid kernel config: skip_sigmas must be at least {min}, got {skip_sigmas}")]
    InvalidKernelConfig {
        /// Requested cutoff.
        skip_sigmas: f64,
        /// Smallest accepted cutoff.
        min: f64,
    },

    /// A beam sigma is not a positive finite number.
    #[error("invalid beam sigma ({sigma_x}, {sigma_y}): both must be positive")]
    InvalidSigma {
        /// Sigma along x in mm.
        sigma_x: f64,
        /// Sigma along y in mm.
        sigma_y: f64,
    },

    /// Samples or rows were observed out of timestamp order.
    #[error("stream ordering violation: {0}")]
    StreamOrderingViolation(OrderingViolation),

    /// Bin edges or bin counts describe an empty or non-monotonic grid.
    #[error("invalid bins: {0}")]
    InvalidBins(String),

    /// Speed or acceleration cannot describe a motion profile.
    #[error("invalid kinematics: speed {speed} mm/s, acceleration {accel} mm/s²")]
    InvalidKinematics {
        /// Scan speed in mm/s.
        speed: f64,
        /// Acceleration in mm/s².
        accel: f64,
    },

    /// The scan area has zero extent along one axis.
    #[error("scan area has no extent ({width} mm x {height} mm)")]
    EmptyScan {
        /// Extent along x in mm.
        width: f64,
        /// Extent along y in mm.
        height: f64,
    },
}

/// Result type for reconstruction.
pub type Result<T> = std::result::Result<T, FluenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_violation_mentions_index() {
        let err = FluenceError::StreamOrderingViolation(OrderingViolation::BeamSample {
            index: 42,
            previous: 2.0,
            timestamp: 1.0,
        });
        let text = err.to_string();
        assert!(text.contains("beam sample 42"));
        assert!(text.contains("ordering violation"));
    }

    #[test]
    fn test_kernel_config_message() {
        let err = FluenceError::InvalidKernelConfig {
            skip_sigmas: 2.0,
            min: 3.0,
        };
        assert!(err.to_string().contains("at least 3"));
    }
}
