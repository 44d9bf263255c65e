use std::error::Error;

use clap::Args;
use grid_batch::{Scheduler, SlurmScheduler};

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub fn run(_args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let mut scheduler = SlurmScheduler::new()?;
    let snapshots = scheduler.poll_all()?;
    if snapshots.is_empty() {
        println!("no jobs in the queue");
        return Ok(());
    }
    for (index, snapshot) in snapshots.iter().enumerate() {
        println!(
            "[{index:>2}] {}: {:?} on {}",
            snapshot.id, snapshot.state, snapshot.nodes
        );
    }
    Ok(())
}
