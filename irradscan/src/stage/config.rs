//! Persistent stage state: travel counters and named positions.
//!
//! The state is an explicit value owned by the [`XyStage`](super::XyStage)
//! and written to disk only when [`StageConfig::save`] is called, typically
//! from the shutdown handler.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::axis::AxisId;
use super::error::{Result, StageError};
use crate::units::DistanceUnit;

/// Default speed the stage returns to after a scan, in mm/s.
pub const DEFAULT_STAGE_SPEED: f64 = 10.0;

/// Default travel per axis between maintenance notices, in mm (1 km).
pub const DEFAULT_MAINTENANCE_INTERVAL_MM: f64 = 1_000_000.0;

/// Accumulated travel per axis in mm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisTravel {
    /// Travel of the x-axis.
    pub x: f64,
    /// Travel of the y-axis.
    pub y: f64,
}

impl AxisTravel {
    /// Travel of one axis.
    pub fn get(&self, axis: AxisId) -> f64 {
        match axis {
            AxisId::X => self.x,
            AxisId::Y => self.y,
        }
    }

    /// Mutable travel of one axis.
    pub fn get_mut(&mut self, axis: AxisId) -> &mut f64 {
        match axis {
            AxisId::X => &mut self.x,
            AxisId::Y => &mut self.y,
        }
    }
}

/// A stored stage position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPosition {
    /// X coordinate in `unit`.
    pub x: f64,
    /// Y coordinate in `unit`.
    pub y: f64,
    /// Unit of the coordinates.
    pub unit: DistanceUnit,
    /// RFC 3339 time of the last update.
    pub date: String,
}

/// Stage state persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Speed restored after scans, in mm/s.
    pub default_speed: f64,
    /// Travel between maintenance notices, in mm.
    pub maintenance_interval_mm: f64,
    /// Travel since the last maintenance notice.
    pub interval_travel: AxisTravel,
    /// Lifetime travel.
    pub total_travel: AxisTravel,
    /// Named positions.
    pub positions: BTreeMap<String, NamedPosition>,
    /// RFC 3339 time of the last change.
    pub last_update: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_STAGE_SPEED,
            maintenance_interval_mm: DEFAULT_MAINTENANCE_INTERVAL_MM,
            interval_travel: AxisTravel::default(),
            total_travel: AxisTravel::default(),
            positions: BTreeMap::new(),
            last_update: None,
        }
    }
}

impl StageConfig {
    /// Loads the state from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| StageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            StageError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!(path = %path.display(), "Loaded stage state");
        Ok(config)
    }

    /// Loads the state, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No stage state file, using defaults");
            Ok(Self::default())
        }
    }

    /// Writes the state to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source| StageError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write to temp file first, then rename
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path).map_err(io_err)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            StageError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        std::fs::rename(&temp_path, path).map_err(io_err)?;

        info!(path = %path.display(), "Saved stage state");
        Ok(())
    }

    /// Stamps `last_update` with the current time.
    pub fn touch(&mut self) {
        self.last_update = Some(chrono::Utc::now().to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StageConfig::default();
        assert_eq!(config.default_speed, 10.0);
        assert!(config.positions.is_empty());
        assert!(config.last_update.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stage.json");

        let mut config = StageConfig::default();
        config.total_travel.x = 1234.5;
        config.positions.insert(
            "beam".to_string(),
            NamedPosition {
                x: 1.0,
                y: 2.0,
                unit: DistanceUnit::Cm,
                date: "2024-01-01T00:00:00+00:00".to_string(),
            },
        );
        config.touch();
        config.save(&path).unwrap();

        let loaded = StageConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = StageConfig::load_or_default(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config, StageConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stage.json");
        std::fs::write(&path, r#"{"total_travel": {"x": 5.0, "y": 6.0}}"#).unwrap();

        let config = StageConfig::load(&path).unwrap();
        assert_eq!(config.total_travel.get(AxisId::Y), 6.0);
        assert_eq!(config.maintenance_interval_mm, DEFAULT_MAINTENANCE_INTERVAL_MM);
    }

    #[test]
    fn test_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StageConfig::load(&path),
            Err(StageError::Json { .. })
        ));
    }
}
