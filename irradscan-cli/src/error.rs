//! CLI error type.

use std::io;

use irradscan::config::ConfigError;
use irradscan::fluence::FluenceError;
use irradscan::sampler::SamplerError;
use irradscan::scan::ScanError;
use irradscan::stage::StageError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration or arguments.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be initialized.
    #[error("Failed to initialize logging: {0}")]
    Logging(#[source] io::Error),

    /// Stage failure outside a scan.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Scan controller failure.
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Beam sampler failure.
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    /// Reconstruction failure.
    #[error("Reconstruction error: {0}")]
    Fluence(#[from] FluenceError),

    /// Reading or writing an output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}
