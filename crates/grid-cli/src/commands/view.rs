use std::error::Error;

use clap::Args;
use grid_batch::output_path;

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Scheduler job id whose captured output to print.
    #[arg(long)]
    pub job: u64,
}

pub fn run(args: &ViewArgs) -> Result<(), Box<dyn Error>> {
    let path = output_path(args.job);
    let contents = std::fs::read_to_string(&path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    print!("{contents}");
    Ok(())
}
