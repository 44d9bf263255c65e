use std::error::Error;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "gridrun", about = "Parameter sweep orchestration for batch clusters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate a sweep and submit every non-duplicate combination.
    Run(commands::run::RunArgs),
    /// Show the scheduler's view of the current jobs.
    Status(commands::status::StatusArgs),
    /// Stream a running job's live output.
    Attach(commands::attach::AttachArgs),
    /// Cancel a submitted job.
    Cancel(commands::cancel::CancelArgs),
    /// Print a finished job's captured output.
    View(commands::view::ViewArgs),
    /// Re-run the parser over audited job outputs and insert the results.
    Reparse(commands::reparse::ReparseArgs),
    /// Execute one submitted experiment. Launched by the scheduler, not by hand.
    #[command(hide = true)]
    Worker(commands::worker::WorkerArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::run(&args),
        Command::Status(args) => commands::status::run(&args),
        Command::Attach(args) => commands::attach::run(&args),
        Command::Cancel(args) => commands::cancel::run(&args),
        Command::View(args) => commands::view::run(&args),
        Command::Reparse(args) => commands::reparse::run(&args),
        Command::Worker(args) => commands::worker::run(&args),
    }
}
