//! Reconstruct command - rebuild a fluence map from a saved scan record.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use irradscan::fluence::{
    reconstruct_parallel, FluenceMap, FluenceReconstructor, ReconstructionConfig,
};
use irradscan::scan::ScanRecord;
use tracing::info;

use super::common::{
    print_map_summary, resolve_reconstruction, row_progress_bar, ReconstructionArgs,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the reconstruct command.
#[derive(Debug, Args)]
pub struct ReconstructArgs {
    /// Scan record written by `irradscan simulate --record`
    pub record: PathBuf,

    /// Write the fluence map as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub reconstruction: ReconstructionArgs,
}

/// Run the reconstruct command.
pub fn run(args: ReconstructArgs, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("reconstruct");
    let config = resolve_reconstruction(&args.reconstruction, runner.config())?;

    let record = ScanRecord::load(&args.record)?;
    let (bins_x, bins_y) = config.bins;

    println!("IrradScan Fluence Reconstruction v{}", irradscan::VERSION);
    println!("==================================");
    println!();
    println!("Record:    {}", args.record.display());
    println!(
        "Area:      {} mm x {} mm ({} rows)",
        record.area.width(),
        record.area.height(),
        record.area.n_rows()
    );
    println!("Rows:      {}", record.rows.len());
    println!("Samples:   {}", record.beam.len());
    println!(
        "Kernel:    sigma {} x {} mm, cutoff {} sigma",
        config.kernel.sigma_x(),
        config.kernel.sigma_y(),
        config.kernel.skip_sigmas()
    );
    println!("Bins:      {} x {}", bins_x, bins_y);
    println!();

    let started = Instant::now();
    let map = if args.reconstruction.parallel {
        println!("Reconstructing {} rows in parallel...", record.rows.len());
        reconstruct_parallel(&record.rows, &record.beam, &record.area, &config)?
    } else {
        reconstruct_rows(&record, config)?
    };
    let elapsed = started.elapsed();

    info!(
        rows = record.rows.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        deposited = map.deposited_particles,
        "Reconstruction complete"
    );
    println!(
        "{} {} rows in {:.2?}",
        style("Reconstructed").green().bold(),
        record.rows.len(),
        elapsed
    );
    println!();
    print_map_summary(&map);

    if let Some(path) = &args.output {
        map.save(path)?;
        println!();
        println!("Fluence map written to {}", path.display());
    }

    Ok(())
}

/// Sequential reconstruction with a progress bar per row.
fn reconstruct_rows(
    record: &ScanRecord,
    config: ReconstructionConfig,
) -> Result<FluenceMap, CliError> {
    let mut reconstructor = FluenceReconstructor::new(&record.area, config)?;
    let progress = row_progress_bar(Some(record.rows.len() as u64));

    for row in &record.rows {
        let deposit = match reconstructor.process_row(row, &record.beam) {
            Ok(deposit) => deposit,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };
        progress.set_message(format!(
            "row {} ({:.3e} particles)",
            row.row_index,
            deposit.particles()
        ));
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(reconstructor.finish())
}
