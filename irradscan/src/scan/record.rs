//! Authoritative per-row log and saved scan sessions.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::area::ScanArea;
use super::error::{Result, ScanError};
use crate::fluence::BeamSampleStream;

/// One physical traversal of a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowEvent {
    /// Row index within the scan area.
    pub row_index: usize,
    /// Sweep index, `None` for a single-row scan.
    pub sweep_index: Option<u32>,
    /// UNIX timestamp when the x move was commanded.
    pub start_timestamp: f64,
    /// UNIX timestamp when the x move was acknowledged.
    pub stop_timestamp: f64,
    /// X position at row start in mm.
    pub x_start: f64,
    /// X position at row stop in mm.
    pub x_stop: f64,
    /// Y position of the row in mm.
    pub y_start: f64,
    /// X-axis speed during the row in mm/s.
    pub scan_speed: f64,
}

impl RowEvent {
    /// Measured duration of the row in seconds.
    pub fn duration(&self) -> f64 {
        self.stop_timestamp - self.start_timestamp
    }
}

/// Everything needed to reconstruct a session offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Scanned area.
    pub area: ScanArea,
    /// Row events in time order.
    pub rows: Vec<RowEvent>,
    /// Beam current recorded during the session.
    pub beam: BeamSampleStream,
}

impl ScanRecord {
    /// Bundles a session.
    pub fn new(area: ScanArea, rows: Vec<RowEvent>, beam: BeamSampleStream) -> Self {
        Self { area, rows, beam }
    }

    /// Writes the record as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source| ScanError::RecordIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(|source| {
            ScanError::RecordFormat {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!(
            path = %path.display(),
            rows = self.rows.len(),
            samples = self.beam.len(),
            "Saved scan record"
        );
        Ok(())
    }

    /// Reads a record written by [`save`](Self::save).
    ///
    /// Beam samples are validated for strict timestamp order while loading.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| ScanError::RecordIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ScanError::RecordFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluence::BeamSample;
    use crate::stage::Position;
    use tempfile::TempDir;

    fn record() -> ScanRecord {
        let area = ScanArea::from_relative(
            Position::default(),
            Position::default(),
            Position::new(4.0, 2.0),
            10.0,
            1.0,
        )
        .unwrap();
        let rows = vec![RowEvent {
            row_index: 0,
            sweep_index: Some(0),
            start_timestamp: 1.0,
            stop_timestamp: 1.5,
            x_start: 0.0,
            x_stop: 4.0,
            y_start: 0.0,
            scan_speed: 10.0,
        }];
        let beam = BeamSampleStream::from_samples(vec![
            BeamSample::new(1.0, 1e-9),
            BeamSample::new(1.25, 1e-9),
        ])
        .unwrap();
        ScanRecord::new(area, rows, beam)
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let original = record();
        original.save(&path).unwrap();

        let loaded = ScanRecord::load(&path).unwrap();
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.area.n_rows(), 2);
        assert_eq!(loaded.beam.len(), 2);
        assert_eq!(loaded.rows[0].duration(), 0.5);
    }

    #[test]
    fn test_load_rejects_unordered_beam() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut json = serde_json::to_value(record()).unwrap();
        json["beam"] = serde_json::json!([
            {"timestamp": 2.0, "current": 0.0},
            {"timestamp": 1.0, "current": 0.0}
        ]);
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(
            ScanRecord::load(&path),
            Err(ScanError::RecordFormat { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ScanRecord::load(Path::new("/nonexistent/session.json")),
            Err(ScanError::RecordIo { .. })
        ));
    }
}
