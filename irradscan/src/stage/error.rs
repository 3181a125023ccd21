//! Stage error types.

use std::path::PathBuf;

use thiserror::Error;

use super::axis::{AxisError, AxisId};

/// Errors raised by [`XyStage`](super::XyStage) operations.
#[derive(Debug, Error)]
pub enum StageError {
    /// The axis rejected a command or did not acknowledge it.
    #[error("{axis}-axis returned unexpected reply: {data}")]
    UnexpectedReply {
        /// Axis that answered.
        axis: AxisId,
        /// Reply payload.
        data: String,
    },

    /// The link to an axis failed.
    #[error("{axis}-axis communication failed: {source}")]
    Axis {
        /// Axis that failed.
        axis: AxisId,
        /// Underlying transport error.
        #[source]
        source: AxisError,
    },

    /// A named position is not stored in the stage configuration.
    #[error("position '{name}' is not known (known: {known})")]
    UnknownPosition {
        /// Requested name.
        name: String,
        /// Comma-separated list of known names.
        known: String,
    },

    /// Reading or writing the stage state file failed.
    #[error("stage state file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The stage state file is not valid JSON.
    #[error("invalid stage state file {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl StageError {
    /// Whether the error came from the hardware rather than from persistence
    /// or lookups.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            StageError::UnexpectedReply { .. } | StageError::Axis { .. }
        )
    }
}

/// Result type for stage operations.
pub type Result<T> = std::result::Result<T, StageError>;
