use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use grid_batch::SlurmScheduler;
use grid_core::RunOptions;
use grid_run::Controller;
use grid_store::ResultStore;
use grid_sweep::{pretty_binding, SweepFile};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Sweep description file (YAML).
    #[arg(long)]
    pub sweep: PathBuf,
    /// Re-run combinations even if the store already holds matching rows.
    #[arg(short, long)]
    pub force: bool,
    /// Run and audit, but skip result insertion.
    #[arg(long)]
    pub no_insert: bool,
    /// Print rendered commands without submitting anything.
    #[arg(short = 'y', long)]
    pub dry_run: bool,
    /// Exclude the source annotation tag from dedup comparison.
    #[arg(long)]
    pub no_include_tag: bool,
    /// Override the sweep file's source annotation tag.
    #[arg(long)]
    pub tag: Option<String>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut spec = SweepFile::load(&args.sweep)?;
    if let Some(tag) = &args.tag {
        spec.tag = Some(tag.clone());
    }
    let options = RunOptions {
        force: args.force,
        no_insert: args.no_insert,
        dry_run: args.dry_run,
        include_tag: !args.no_include_tag,
    };

    let store = ResultStore::open(&spec.database)?;
    let scheduler = SlurmScheduler::new()?;
    let job_name = args
        .sweep
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("gridrun")
        .to_string();
    let worker_command = format!("{} worker", std::env::current_exe()?.display());

    let mut controller = Controller::new(spec, store, scheduler, options)
        .with_job_name(job_name)
        .with_worker_command(worker_command);
    let report = controller.submit_all()?;
    println!(
        "submitted {} | skipped {} | dry-run {} | failed {}",
        report.submitted.len(),
        report.skipped,
        report.dry_runs,
        report.failures
    );

    if !report.submitted.is_empty() {
        for (index, snapshot) in controller.status()?.iter().enumerate() {
            println!("[{index:>2}] {}: {:?} on {}", snapshot.id, snapshot.state, snapshot.nodes);
            if let Some(binding) = controller.binding_for(snapshot.id) {
                println!("     {}", pretty_binding(binding));
            }
        }
    }
    Ok(())
}
