//! User configuration.
//!
//! Settings live in an INI file under the platform config directory
//! (`~/.config/irradscan/config.ini` on Linux). Every key has a default, so
//! a missing file or section is not an error.
//!
//! ```ini
//! [stage]
//! default_speed = 10
//! maintenance_interval_mm = 1000000
//!
//! [scan]
//! scan_speed = 10
//! step_size = 1
//! pause_poll_ms = 100
//!
//! [fluence]
//! bins_x = 200
//! bins_y = 200
//! sigma_x = 2.01
//! sigma_y = 1.37
//! skip_sigmas = 6
//! scan_accel = 2500
//! hardness_factor = 1
//!
//! [telemetry]
//! capacity = 16
//! sender = irradscan
//!
//! [logging]
//! level = info
//! ```

mod file;
mod keys;

pub use file::{
    config_dir, config_file_path, ConfigError, ConfigFile, FluenceSettings, LoggingSettings,
    Result, ScanSettings, StageSettings, TelemetrySettings, APP_DIR, CONFIG_FILE_NAME,
    DEFAULT_LOG_LEVEL, DEFAULT_PAUSE_POLL_MS, DEFAULT_SCAN_SPEED, DEFAULT_STEP_SIZE,
    STAGE_STATE_FILE_NAME,
};
pub use keys::ConfigKey;
