use std::error::Error;

use clap::Args;
use grid_batch::SlurmScheduler;
use grid_run::{attach, AttachOutcome, AttachPacing, CancelToken};

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Scheduler job id to attach to.
    #[arg(long)]
    pub job: u64,
}

pub fn run(args: &AttachArgs) -> Result<(), Box<dyn Error>> {
    let mut scheduler = SlurmScheduler::new()?;
    let token = CancelToken::new();
    let outcome = attach(
        &mut scheduler,
        args.job,
        &token,
        &AttachPacing::default(),
        &mut |line| println!("{line}"),
    )?;
    match outcome {
        AttachOutcome::Streamed => {}
        AttachOutcome::NoStep => println!(
            "job step not found, it may have finished already; try `gridrun view --job {}`",
            args.job
        ),
        AttachOutcome::Interrupted => println!("detached"),
    }
    Ok(())
}
