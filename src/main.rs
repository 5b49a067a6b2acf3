/// Main entry point for HabitFlow
///
/// This file sets up logging, parses command line arguments, and runs one
/// command against the configured record store.

use clap::Parser;
use tracing::{error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("habitflow={}", log_level))
        .with_writer(std::io::stderr) // Send logs to stderr, not stdout
        .init();

    info!("Starting HabitFlow");

    let result = match args.resolve_config() {
        Ok(config) => cli::run(args.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("HabitFlow shutdown complete");
}
