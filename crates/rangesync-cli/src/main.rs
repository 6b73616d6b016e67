use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod driver;
mod harness;

#[derive(Parser)]
#[command(name = "rangesync")]
#[command(about = "Range-based set reconciliation tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile two sets fed as `mode,timestamp,id` lines on stdin
    Harness(harness::HarnessArgs),
    /// Reconcile randomized sets repeatedly (ITERS / SEED env variables)
    Driver(driver::DriverArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Harness(args) => harness::run(args),
        Commands::Driver(args) => driver::run(args),
    }
}
