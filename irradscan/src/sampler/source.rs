//! Beam current sources.

use thiserror::Error;

/// Errors raised while sampling the beam current.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The current source failed to produce a reading.
    #[error("current source '{source_name}' failed: {message}")]
    Source {
        /// Source name.
        source_name: String,
        /// Failure description.
        message: String,
    },

    /// Sampling rate is not a positive finite number.
    #[error("invalid sampling rate {0} Hz")]
    InvalidRate(f64),

    /// The sampler thread could not be spawned.
    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// Anything that can report the instantaneous beam current in amperes.
///
/// Implementations wrap an ADC readout or a simulation; `elapsed_s` is the
/// time since sampling started.
pub trait CurrentSource: Send {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Reads the current in A.
    fn read_current(&mut self, elapsed_s: f64) -> Result<f64>;
}

/// Constant beam with optional outages, for simulation and tests.
#[derive(Debug, Clone)]
pub struct ConstantCurrent {
    current: f64,
    outages: Vec<(f64, f64)>,
}

impl ConstantCurrent {
    /// A beam delivering `current` amperes.
    pub fn new(current: f64) -> Self {
        Self {
            current,
            outages: Vec::new(),
        }
    }

    /// Drops the current to zero during `[from_s, from_s + duration_s)`.
    pub fn with_outage(mut self, from_s: f64, duration_s: f64) -> Self {
        self.outages.push((from_s, from_s + duration_s));
        self
    }

    /// Current at `elapsed_s` seconds after the start.
    pub fn current_at(&self, elapsed_s: f64) -> f64 {
        if self
            .outages
            .iter()
            .any(|&(from, to)| elapsed_s >= from && elapsed_s < to)
        {
            0.0
        } else {
            self.current
        }
    }
}

impl CurrentSource for ConstantCurrent {
    fn name(&self) -> &str {
        "constant"
    }

    fn read_current(&mut self, elapsed_s: f64) -> Result<f64> {
        Ok(self.current_at(elapsed_s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_current() {
        let mut source = ConstantCurrent::new(2e-9);
        assert_eq!(source.read_current(0.0).unwrap(), 2e-9);
        assert_eq!(source.read_current(1e3).unwrap(), 2e-9);
    }

    #[test]
    fn test_outage_window() {
        let source = ConstantCurrent::new(1e-9).with_outage(1.0, 0.5);
        assert_eq!(source.current_at(0.99), 1e-9);
        assert_eq!(source.current_at(1.0), 0.0);
        assert_eq!(source.current_at(1.49), 0.0);
        assert_eq!(source.current_at(1.5), 1e-9);
    }

    #[test]
    fn test_error_display() {
        let err = SamplerError::Source {
            source_name: "adc".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "current source 'adc' failed: timeout");
    }
}
