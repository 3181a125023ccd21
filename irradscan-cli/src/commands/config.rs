//! Config command - inspect and edit `config.ini`.
//!
//! Values are shown with their physical units, and keys that differ from
//! the built-in defaults are marked with `*`. `config reset` puts a single
//! key back to its default. `config path` also reports where the stage
//! state (named positions, travel counters) is kept.

use clap::Subcommand;
use console::style;
use irradscan::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show one setting with its unit
    Get {
        /// Key as section.key (e.g. scan.scan_speed)
        key: String,
    },

    /// Change one setting
    Set {
        /// Key as section.key (e.g. fluence.sigma_x)
        key: String,

        /// New value, in the unit shown by `config list`
        value: String,
    },

    /// Restore one setting to its default
    Reset {
        /// Key as section.key
        key: String,
    },

    /// List settings grouped by section
    List {
        /// Only show this section (stage, scan, fluence, telemetry, logging)
        #[arg(long)]
        section: Option<String>,

        /// Only show settings that differ from the defaults
        #[arg(long)]
        changed: bool,
    },

    /// Show the config file and stage state file locations
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load()?;
            println!("{} = {}", key.name(), describe(key, &config));
            Ok(())
        }
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::Reset { key } => run_reset(&key),
        ConfigCommands::List { section, changed } => run_list(section.as_deref(), changed),
        ConfigCommands::Path => run_path(),
    }
}

// =============================================================================
// Presentation
// =============================================================================

/// Unit printed after a key's value.
fn unit(key: ConfigKey) -> Option<&'static str> {
    use ConfigKey::*;
    match key {
        StageDefaultSpeed | ScanSpeed => Some("mm/s"),
        StageMaintenanceInterval | ScanStepSize | FluenceSigmaX | FluenceSigmaY => Some("mm"),
        ScanPausePollMs => Some("ms"),
        FluenceBinsX | FluenceBinsY => Some("bins"),
        FluenceSkipSigmas => Some("sigma"),
        FluenceScanAccel => Some("mm/s^2"),
        TelemetryCapacity => Some("messages"),
        _ => None,
    }
}

/// One-line description of an INI section.
fn section_summary(section: &str) -> &'static str {
    match section {
        "stage" => "axis speed, maintenance and stored positions",
        "scan" => "raster geometry and pause polling",
        "fluence" => "reconstruction grid and beam kernel",
        "telemetry" => "published message stream",
        "logging" => "log level and log files",
        _ => "",
    }
}

/// Whether `key` differs from its default in `config`.
fn is_changed(key: ConfigKey, config: &ConfigFile) -> bool {
    key.get(config) != key.get(&ConfigFile::default())
}

/// Value with unit; unset optional paths show where the default resolves.
fn describe(key: ConfigKey, config: &ConfigFile) -> String {
    let value = key.get(config);
    if value.is_empty() {
        return match key {
            ConfigKey::StageStateFile => {
                format!("(default: {})", config.stage_state_path().display())
            }
            _ => "(not set)".to_string(),
        };
    }
    match unit(key) {
        Some(unit) => format!("{} {}", value, unit),
        None => value,
    }
}

/// Lines of `config list`, one header per section.
fn list_lines(config: &ConfigFile, section: Option<&str>, changed_only: bool) -> Vec<String> {
    let keys: Vec<ConfigKey> = ConfigKey::all()
        .iter()
        .copied()
        .filter(|k| section.map_or(true, |s| k.section() == s))
        .filter(|k| !changed_only || is_changed(*k, config))
        .collect();
    let width = keys.iter().map(|k| k.key_name().len()).max().unwrap_or(0);

    let mut lines = Vec::new();
    let mut current = "";
    for key in keys {
        if key.section() != current {
            if !current.is_empty() {
                lines.push(String::new());
            }
            current = key.section();
            lines.push(format!("[{}]  {}", current, section_summary(current)));
        }
        let marker = if is_changed(key, config) { '*' } else { ' ' };
        lines.push(format!(
            " {} {:<width$}  {}",
            marker,
            key.key_name(),
            describe(key, config),
            width = width
        ));
    }
    lines
}

// =============================================================================
// Commands
// =============================================================================

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown key '{}'. Run 'irradscan config list' for the available keys.",
            key
        ))
    })
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    let before = describe(key, &config);

    key.set(&mut config, value)?;
    config.save()?;

    println!("{}: {} -> {}", key.name(), before, describe(key, &config));
    Ok(())
}

fn run_reset(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    if !is_changed(key, &config) {
        println!("{} already at default ({})", key.name(), describe(key, &config));
        return Ok(());
    }

    reset_key(key, &mut config)?;
    config.save()?;

    println!("{} reset to {}", key.name(), describe(key, &config));
    Ok(())
}

fn reset_key(key: ConfigKey, config: &mut ConfigFile) -> Result<(), CliError> {
    key.set(config, &key.get(&ConfigFile::default()))?;
    Ok(())
}

fn run_list(section: Option<&str>, changed_only: bool) -> Result<(), CliError> {
    if let Some(s) = section {
        if !ConfigKey::all().iter().any(|k| k.section() == s) {
            return Err(CliError::Config(format!("Unknown section '{}'", s)));
        }
    }
    let config = ConfigFile::load()?;

    println!("{}", style(config_file_path().display()).dim());
    println!();
    let lines = list_lines(&config, section, changed_only);
    if lines.is_empty() {
        println!("All settings are at their defaults.");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn run_path() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let config_path = config_file_path();
    let state_path = config.stage_state_path();

    for (label, path) in [("Config:", &config_path), ("Stage state:", &state_path)] {
        let status = if path.exists() {
            style("exists").green()
        } else {
            style("not created yet").yellow()
        };
        println!("{:<13}{} ({})", label, path.display(), status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_appends_unit() {
        let config = ConfigFile::default();
        let speed = describe(ConfigKey::ScanSpeed, &config);
        assert!(speed.ends_with(" mm/s"), "{}", speed);
        assert_eq!(describe(ConfigKey::LoggingLevel, &config), "info");
    }

    #[test]
    fn test_describe_unset_state_file_shows_resolved_default() {
        let config = ConfigFile::default();
        let text = describe(ConfigKey::StageStateFile, &config);
        assert!(text.starts_with("(default: "), "{}", text);
        assert!(text.contains("stage.json"), "{}", text);
    }

    #[test]
    fn test_list_marks_changed_keys() {
        let mut config = ConfigFile::default();
        ConfigKey::ScanSpeed.set(&mut config, "25").unwrap();

        let lines = list_lines(&config, Some("scan"), false);
        assert!(lines[0].starts_with("[scan]"));
        assert_eq!(lines.len(), 4);

        let speed = lines.iter().find(|l| l.contains("scan_speed")).unwrap();
        assert!(speed.starts_with(" *"), "{}", speed);
        assert!(speed.ends_with("25 mm/s"), "{}", speed);
        let step = lines.iter().find(|l| l.contains("step_size")).unwrap();
        assert!(step.starts_with("  "), "{}", step);
    }

    #[test]
    fn test_list_changed_only() {
        let mut config = ConfigFile::default();
        assert!(list_lines(&config, None, true).is_empty());

        ConfigKey::FluenceSigmaX.set(&mut config, "2.5").unwrap();
        let lines = list_lines(&config, None, true);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[fluence]"));
        assert!(lines[1].contains("sigma_x"));
    }

    #[test]
    fn test_list_separates_sections() {
        let lines = list_lines(&ConfigFile::default(), None, false);
        let headers = lines.iter().filter(|l| l.starts_with('[')).count();
        assert_eq!(headers, 5);
        assert_eq!(lines.len(), ConfigKey::all().len() + 2 * headers - 1);
    }

    #[test]
    fn test_reset_key_restores_default() {
        let mut config = ConfigFile::default();
        ConfigKey::TelemetrySender.set(&mut config, "beamline-2").unwrap();
        ConfigKey::StageStateFile.set(&mut config, "/tmp/stage.json").unwrap();

        reset_key(ConfigKey::TelemetrySender, &mut config).unwrap();
        reset_key(ConfigKey::StageStateFile, &mut config).unwrap();

        assert!(!is_changed(ConfigKey::TelemetrySender, &config));
        assert!(config.stage.state_file.is_none());
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = parse_key("scan.nope").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
