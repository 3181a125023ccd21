//! INI configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::{debug, info};

use super::keys::ConfigKey;
use crate::fluence::{
    KernelParams, ReconstructionConfig, DEFAULT_BINS, DEFAULT_HARDNESS_FACTOR, DEFAULT_SCAN_ACCEL,
    DEFAULT_SIGMA_X, DEFAULT_SIGMA_Y, DEFAULT_SKIP_SIGMAS,
};
use crate::stage::{DEFAULT_MAINTENANCE_INTERVAL_MM, DEFAULT_STAGE_SPEED};
use crate::telemetry::{DEFAULT_SENDER_NAME, DEFAULT_TELEMETRY_CAPACITY};

/// Application directory name under the platform config directory.
pub const APP_DIR: &str = "irradscan";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Stage state file name used when `stage.state_file` is not set.
pub const STAGE_STATE_FILE_NAME: &str = "stage.json";

/// Default scan speed in mm/s.
pub const DEFAULT_SCAN_SPEED: f64 = 10.0;

/// Default row pitch in mm.
pub const DEFAULT_STEP_SIZE: f64 = 1.0;

/// Default pause poll interval in ms.
pub const DEFAULT_PAUSE_POLL_MS: u64 = 100;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: ini::Error,
    },

    /// The file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A value failed validation.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Key in `section.key` form.
        key: String,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },

    /// The key is not known.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// `[stage]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    /// Axis speed restored after every scan, in mm/s.
    pub default_speed: f64,
    /// Travel between maintenance notices, in mm.
    pub maintenance_interval_mm: f64,
    /// Stage state file; platform default when `None`.
    pub state_file: Option<PathBuf>,
}

/// `[scan]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    /// Scan speed in mm/s.
    pub scan_speed: f64,
    /// Row pitch in mm.
    pub step_size: f64,
    /// Pause poll interval in ms.
    pub pause_poll_ms: u64,
}

/// `[fluence]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FluenceSettings {
    /// Bins along x.
    pub bins_x: usize,
    /// Bins along y.
    pub bins_y: usize,
    /// Beam sigma along x in mm.
    pub sigma_x: f64,
    /// Beam sigma along y in mm.
    pub sigma_y: f64,
    /// Kernel cutoff in sigmas.
    pub skip_sigmas: f64,
    /// Stage acceleration in mm/s².
    pub scan_accel: f64,
    /// Neutron-equivalence factor.
    pub hardness_factor: f64,
}

/// `[telemetry]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySettings {
    /// Channel capacity in messages.
    pub capacity: usize,
    /// Sender name stamped on every message.
    pub sender: String,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,
    /// Directory for daily log files; stderr only when `None`.
    pub directory: Option<PathBuf>,
}

/// Complete configuration with defaults for every key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// `[stage]`
    pub stage: StageSettings,
    /// `[scan]`
    pub scan: ScanSettings,
    /// `[fluence]`
    pub fluence: FluenceSettings,
    /// `[telemetry]`
    pub telemetry: TelemetrySettings,
    /// `[logging]`
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            stage: StageSettings {
                default_speed: DEFAULT_STAGE_SPEED,
                maintenance_interval_mm: DEFAULT_MAINTENANCE_INTERVAL_MM,
                state_file: None,
            },
            scan: ScanSettings {
                scan_speed: DEFAULT_SCAN_SPEED,
                step_size: DEFAULT_STEP_SIZE,
                pause_poll_ms: DEFAULT_PAUSE_POLL_MS,
            },
            fluence: FluenceSettings {
                bins_x: DEFAULT_BINS.0,
                bins_y: DEFAULT_BINS.1,
                sigma_x: DEFAULT_SIGMA_X,
                sigma_y: DEFAULT_SIGMA_Y,
                skip_sigmas: DEFAULT_SKIP_SIGMAS,
                scan_accel: DEFAULT_SCAN_ACCEL,
                hardness_factor: DEFAULT_HARDNESS_FACTOR,
            },
            telemetry: TelemetrySettings {
                capacity: DEFAULT_TELEMETRY_CAPACITY,
                sender: DEFAULT_SENDER_NAME.to_string(),
            },
            logging: LoggingSettings {
                level: DEFAULT_LOG_LEVEL.to_string(),
                directory: None,
            },
        }
    }
}

impl ConfigFile {
    /// Loads the user config file, or defaults when it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Loads a config file, or defaults when it does not exist.
    ///
    /// Keys missing from the file keep their defaults; unknown keys are
    /// ignored.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Builds a config from parsed INI data.
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Renders every key, skipping unset optional ones.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Saves to the user config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Saves to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Stage state file, falling back to the platform default.
    pub fn stage_state_path(&self) -> PathBuf {
        self.stage
            .state_file
            .clone()
            .unwrap_or_else(|| config_dir().join(STAGE_STATE_FILE_NAME))
    }

    /// Kernel from the `[fluence]` section.
    pub fn kernel(&self) -> crate::fluence::Result<KernelParams> {
        KernelParams::new(
            self.fluence.sigma_x,
            self.fluence.sigma_y,
            self.fluence.skip_sigmas,
        )
    }

    /// Reconstruction settings from the `[fluence]` section.
    pub fn reconstruction(&self) -> crate::fluence::Result<ReconstructionConfig> {
        Ok(ReconstructionConfig::default()
            .with_bins(self.fluence.bins_x, self.fluence.bins_y)
            .with_kernel(self.kernel()?)
            .with_scan_accel(self.fluence.scan_accel)
            .with_hardness_factor(self.fluence.hardness_factor))
    }
}

/// Application config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the user config file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = ConfigFile::default();
        config.scan.step_size = 0.5;
        config.fluence.bins_x = 64;
        config.telemetry.sender = "bench".to_string();
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[fluence]\nsigma_x = 3.5\n\n[other]\nkey = 1\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.fluence.sigma_x, 3.5);
        assert_eq!(config.fluence.sigma_y, DEFAULT_SIGMA_Y);
        assert_eq!(config.scan, ConfigFile::default().scan);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[fluence]\nskip_sigmas = 2\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "fluence.skip_sigmas"));
    }

    #[test]
    fn test_reconstruction_settings() {
        let mut config = ConfigFile::default();
        config.fluence.bins_x = 50;
        config.fluence.bins_y = 40;
        let rc = config.reconstruction().unwrap();
        assert_eq!(rc.bins, (50, 40));
        assert_eq!(rc.kernel.sigma_x(), DEFAULT_SIGMA_X);
    }

    #[test]
    fn test_stage_state_path_override() {
        let mut config = ConfigFile::default();
        assert!(config.stage_state_path().ends_with(STAGE_STATE_FILE_NAME));
        config.stage.state_file = Some(PathBuf::from("/tmp/stage.json"));
        assert_eq!(config.stage_state_path(), PathBuf::from("/tmp/stage.json"));
    }
}
