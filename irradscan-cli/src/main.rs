//! IrradScan CLI - command-line interface
//!
//! Runs simulated raster scans, reconstructs fluence maps from saved scan
//! records, and manages configuration and stored stage positions.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::reconstruct::ReconstructArgs;
use commands::simulate::SimulateArgs;
use commands::stage::StageCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "irradscan")]
#[command(version, about = "Raster-scan irradiation control and fluence reconstruction")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a raster scan on simulated axes with a simulated beam
    Simulate(SimulateArgs),

    /// Rebuild a fluence map from a saved scan record
    Reconstruct(ReconstructArgs),

    /// Manage stored stage positions and travel counters
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args, cli.verbose),
        Commands::Reconstruct(args) => commands::reconstruct::run(args, cli.verbose),
        Commands::Stage { command } => commands::stage::run(command),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "irradscan",
            "simulate",
            "--width",
            "4",
            "--sweeps",
            "2",
            "--outage",
            "1:0.5",
            "--outage",
            "3:1",
            "--bins-x",
            "50",
            "--direction",
            "row-parity",
            "--parallel",
        ])
        .unwrap();

        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.width, 4.0);
        assert_eq!(args.sweeps, 2);
        assert_eq!(args.outage, vec![(1.0, 0.5), (3.0, 1.0)]);
        assert_eq!(args.reconstruction.bins_x, Some(50));
        assert!(args.reconstruction.parallel);
    }

    #[test]
    fn test_parse_reconstruct() {
        let cli =
            Cli::try_parse_from(["irradscan", "-v", "reconstruct", "scan.json", "-o", "map.json"])
                .unwrap();
        assert!(cli.verbose);
        let Commands::Reconstruct(args) = cli.command else {
            panic!("expected reconstruct");
        };
        assert_eq!(args.record.to_str(), Some("scan.json"));
        assert_eq!(args.output.as_deref().and_then(|p| p.to_str()), Some("map.json"));
    }
}
