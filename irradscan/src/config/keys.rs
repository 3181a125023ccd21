//! Typed access to individual configuration keys.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile, Result};
use crate::fluence::MIN_SKIP_SIGMAS;

/// Log levels accepted by `logging.level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Every configuration key, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    StageDefaultSpeed,
    StageMaintenanceInterval,
    StageStateFile,
    ScanSpeed,
    ScanStepSize,
    ScanPausePollMs,
    FluenceBinsX,
    FluenceBinsY,
    FluenceSigmaX,
    FluenceSigmaY,
    FluenceSkipSigmas,
    FluenceScanAccel,
    FluenceHardnessFactor,
    TelemetryCapacity,
    TelemetrySender,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            StageDefaultSpeed,
            StageMaintenanceInterval,
            StageStateFile,
            ScanSpeed,
            ScanStepSize,
            ScanPausePollMs,
            FluenceBinsX,
            FluenceBinsY,
            FluenceSigmaX,
            FluenceSigmaY,
            FluenceSkipSigmas,
            FluenceScanAccel,
            FluenceHardnessFactor,
            TelemetryCapacity,
            TelemetrySender,
            LoggingLevel,
            LoggingDirectory,
        ]
    }

    /// INI section.
    pub fn section(self) -> &'static str {
        use ConfigKey::*;
        match self {
            StageDefaultSpeed | StageMaintenanceInterval | StageStateFile => "stage",
            ScanSpeed | ScanStepSize | ScanPausePollMs => "scan",
            FluenceBinsX | FluenceBinsY | FluenceSigmaX | FluenceSigmaY | FluenceSkipSigmas
            | FluenceScanAccel | FluenceHardnessFactor => "fluence",
            TelemetryCapacity | TelemetrySender => "telemetry",
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    /// Key within its section.
    pub fn key_name(self) -> &'static str {
        use ConfigKey::*;
        match self {
            StageDefaultSpeed => "default_speed",
            StageMaintenanceInterval => "maintenance_interval_mm",
            StageStateFile => "state_file",
            ScanSpeed => "scan_speed",
            ScanStepSize => "step_size",
            ScanPausePollMs => "pause_poll_ms",
            FluenceBinsX => "bins_x",
            FluenceBinsY => "bins_y",
            FluenceSigmaX => "sigma_x",
            FluenceSigmaY => "sigma_y",
            FluenceSkipSigmas => "skip_sigmas",
            FluenceScanAccel => "scan_accel",
            FluenceHardnessFactor => "hardness_factor",
            TelemetryCapacity => "capacity",
            TelemetrySender => "sender",
            LoggingLevel => "level",
            LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty for unset optional keys.
    pub fn get(self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            StageDefaultSpeed => config.stage.default_speed.to_string(),
            StageMaintenanceInterval => config.stage.maintenance_interval_mm.to_string(),
            StageStateFile => path_string(&config.stage.state_file),
            ScanSpeed => config.scan.scan_speed.to_string(),
            ScanStepSize => config.scan.step_size.to_string(),
            ScanPausePollMs => config.scan.pause_poll_ms.to_string(),
            FluenceBinsX => config.fluence.bins_x.to_string(),
            FluenceBinsY => config.fluence.bins_y.to_string(),
            FluenceSigmaX => config.fluence.sigma_x.to_string(),
            FluenceSigmaY => config.fluence.sigma_y.to_string(),
            FluenceSkipSigmas => config.fluence.skip_sigmas.to_string(),
            FluenceScanAccel => config.fluence.scan_accel.to_string(),
            FluenceHardnessFactor => config.fluence.hardness_factor.to_string(),
            TelemetryCapacity => config.telemetry.capacity.to_string(),
            TelemetrySender => config.telemetry.sender.clone(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => path_string(&config.logging.directory),
        }
    }

    /// Validates and stores a value.
    pub fn set(self, config: &mut ConfigFile, value: &str) -> Result<()> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            StageDefaultSpeed => config.stage.default_speed = self.positive(value)?,
            StageMaintenanceInterval => {
                config.stage.maintenance_interval_mm = self.positive(value)?
            }
            StageStateFile => config.stage.state_file = optional_path(value),
            ScanSpeed => config.scan.scan_speed = self.positive(value)?,
            ScanStepSize => config.scan.step_size = self.positive(value)?,
            ScanPausePollMs => config.scan.pause_poll_ms = self.count(value)? as u64,
            FluenceBinsX => config.fluence.bins_x = self.count(value)?,
            FluenceBinsY => config.fluence.bins_y = self.count(value)?,
            FluenceSigmaX => config.fluence.sigma_x = self.positive(value)?,
            FluenceSigmaY => config.fluence.sigma_y = self.positive(value)?,
            FluenceSkipSigmas => {
                let skip = self.positive(value)?;
                if skip < MIN_SKIP_SIGMAS {
                    return Err(self.invalid(value, &format!("must be at least {MIN_SKIP_SIGMAS}")));
                }
                config.fluence.skip_sigmas = skip;
            }
            FluenceScanAccel => config.fluence.scan_accel = self.positive(value)?,
            FluenceHardnessFactor => config.fluence.hardness_factor = self.positive(value)?,
            TelemetryCapacity => config.telemetry.capacity = self.count(value)?,
            TelemetrySender => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.telemetry.sender = value.to_string();
            }
            LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, &format!("expected one of {}", LOG_LEVELS.join(", "))));
                }
                config.logging.level = level;
            }
            LoggingDirectory => config.logging.directory = optional_path(value),
        }
        Ok(())
    }

    fn invalid(self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn positive(self, value: &str) -> Result<f64> {
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
            _ => Err(self.invalid(value, "expected a positive number")),
        }
    }

    fn count(self, value: &str) -> Result<usize> {
        match value.parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(self.invalid(value, "expected a positive integer")),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let (section, key) = s
            .split_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))?;
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.section() == section && k.key_name() == key)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

fn path_string(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_keys() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
    }

    #[test]
    fn test_parse_unknown_key() {
        assert!(matches!(
            "fluence.bins".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            "nosection".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();
        ConfigKey::ScanStepSize.set(&mut config, " 0.25 ").unwrap();
        assert_eq!(ConfigKey::ScanStepSize.get(&config), "0.25");

        ConfigKey::LoggingLevel.set(&mut config, "DEBUG").unwrap();
        assert_eq!(config.logging.level, "debug");

        ConfigKey::LoggingDirectory.set(&mut config, "/var/log/irradscan").unwrap();
        assert_eq!(
            ConfigKey::LoggingDirectory.get(&config),
            "/var/log/irradscan"
        );
        ConfigKey::LoggingDirectory.set(&mut config, "").unwrap();
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::ScanSpeed.set(&mut config, "-1").is_err());
        assert!(ConfigKey::FluenceBinsX.set(&mut config, "0").is_err());
        assert!(ConfigKey::FluenceSigmaX.set(&mut config, "abc").is_err());
        assert!(ConfigKey::FluenceSkipSigmas.set(&mut config, "2.5").is_err());
        assert!(ConfigKey::LoggingLevel.set(&mut config, "verbose").is_err());
        assert!(ConfigKey::TelemetrySender.set(&mut config, "").is_err());
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_sections_are_contiguous() {
        let sections: Vec<_> = ConfigKey::all().iter().map(|k| k.section()).collect();
        let mut seen = Vec::new();
        for section in sections {
            if seen.last() != Some(&section) {
                assert!(!seen.contains(&section), "section {section} split");
                seen.push(section);
            }
        }
        assert_eq!(seen, ["stage", "scan", "fluence", "telemetry", "logging"]);
    }
}
