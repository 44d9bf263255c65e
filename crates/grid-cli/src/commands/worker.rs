use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use grid_run::run_worker;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Experiment manifest written by the controller at submission.
    pub manifest: PathBuf,
}

pub fn run(args: &WorkerArgs) -> Result<(), Box<dyn Error>> {
    // The worker exits normally whether or not the experiment succeeded;
    // its outcome lives in the audit row.
    let report = run_worker(&args.manifest)?;
    if report.error.is_empty() {
        tracing::info!(
            audit = report.audit_key,
            inserted = report.inserted,
            "experiment complete"
        );
    } else {
        tracing::error!(audit = report.audit_key, error = %report.error, "experiment failed");
    }
    Ok(())
}
