//! Shared startup for commands: configuration and logging.

use irradscan::config::ConfigFile;
use irradscan::logging::{init_logging, LoggingGuard};
use tracing::{info, warn};

use crate::error::CliError;

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Loads the user configuration and installs logging.
    ///
    /// A broken config file is reported and replaced by defaults. `verbose`
    /// raises the log level to `debug`.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let (mut config, load_error) = match ConfigFile::load() {
            Ok(config) => (config, None),
            Err(e) => (ConfigFile::default(), Some(e)),
        };
        if verbose {
            config.logging.level = "debug".to_string();
        }

        let logging = init_logging(&config.logging).map_err(CliError::Logging)?;
        if let Some(e) = load_error {
            warn!(error = %e, "Ignoring unreadable configuration, using defaults");
        }

        Ok(Self {
            config,
            _logging: logging,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Logs the command being run.
    pub fn log_startup(&self, command: &str) {
        info!(version = irradscan::VERSION, command, "IrradScan starting");
    }
}
