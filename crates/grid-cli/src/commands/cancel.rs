use std::error::Error;

use clap::Args;
use grid_batch::{Scheduler, SlurmScheduler};

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Scheduler job id to cancel.
    #[arg(long)]
    pub job: u64,
}

pub fn run(args: &CancelArgs) -> Result<(), Box<dyn Error>> {
    let mut scheduler = SlurmScheduler::new()?;
    scheduler.cancel(args.job)?;
    println!("cancellation requested for job {}", args.job);
    Ok(())
}
