//! Scan controller error types.

use std::path::PathBuf;

use thiserror::Error;

use super::state::ScanState;
use crate::stage::{AxisId, StageError};

/// Errors raised by [`ScanController`](super::ScanController) operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Scan geometry is degenerate.
    #[error("invalid scan geometry: {0}")]
    InvalidGeometry(String),

    /// `start` or `scan_row` was called before `prepare`.
    #[error("no scan area prepared")]
    NotPrepared,

    /// A scan worker is already active.
    #[error("scan already running (state: {0})")]
    AlreadyRunning(ScanState),

    /// Scan speed is not a positive finite number.
    #[error("invalid scan speed {0} mm/s")]
    InvalidScanSpeed(f64),

    /// The requested row is not in the row table.
    #[error("row {row} is not in the scan area (rows 0..{n_rows})")]
    UnknownRow {
        /// Requested row.
        row: usize,
        /// Rows in the area.
        n_rows: usize,
    },

    /// An axis rejected or did not acknowledge a command.
    ///
    /// `data` is the rejected reply payload, or the transport failure when
    /// no acknowledgment arrived at all.
    #[error("{axis}-axis returned unexpected reply: {data}")]
    UnexpectedReply {
        /// Axis that answered.
        axis: AxisId,
        /// Reply payload or transport failure.
        data: String,
    },

    /// Any other stage failure.
    #[error("stage error: {0}")]
    Stage(#[source] StageError),

    /// The scan worker thread could not be spawned or panicked.
    #[error("scan worker failed: {0}")]
    Worker(String),

    /// Reading or writing a scan record failed.
    #[error("scan record {path}: {source}")]
    RecordIo {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A scan record is not valid JSON.
    #[error("invalid scan record {path}: {source}")]
    RecordFormat {
        /// File involved.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<StageError> for ScanError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::UnexpectedReply { axis, data } => ScanError::UnexpectedReply { axis, data },
            StageError::Axis { axis, source } => ScanError::UnexpectedReply {
                axis,
                data: format!("no acknowledgment ({source})"),
            },
            other => ScanError::Stage(other),
        }
    }
}

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::AxisError;

    #[test]
    fn test_rejected_reply_maps_to_unexpected_reply() {
        let err: ScanError = StageError::UnexpectedReply {
            axis: AxisId::Y,
            data: "BADDATA".to_string(),
        }
        .into();
        assert!(matches!(err, ScanError::UnexpectedReply { axis: AxisId::Y, .. }));
        assert!(err.to_string().contains("y-axis"));
    }

    #[test]
    fn test_missing_acknowledgment_maps_to_unexpected_reply() {
        let err: ScanError = StageError::Axis {
            axis: AxisId::X,
            source: AxisError::Transport("link down".to_string()),
        }
        .into();
        match &err {
            ScanError::UnexpectedReply { axis, data } => {
                assert_eq!(*axis, AxisId::X);
                assert!(data.contains("link down"));
            }
            other => panic!("expected UnexpectedReply, got {other:?}"),
        }
        assert!(err.to_string().starts_with("x-axis returned unexpected reply"));
    }

    #[test]
    fn test_other_stage_errors_stay_wrapped() {
        let err: ScanError = StageError::UnknownPosition {
            name: "home".to_string(),
            known: String::new(),
        }
        .into();
        assert!(matches!(err, ScanError::Stage(_)));
    }

    #[test]
    fn test_already_running_shows_state() {
        let err = ScanError::AlreadyRunning(ScanState::Scanning);
        assert_eq!(err.to_string(), "scan already running (state: scanning)");
    }
}
