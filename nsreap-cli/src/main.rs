//! nsreap CLI
//!
//! Runs a command in new Linux namespaces, optionally as child subreaper,
//! and collects every process of the resulting tree.

use clap::Parser;
use std::io::IsTerminal;
use std::process;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod cli;
mod run;

use cli::Cli;

// Single-threaded, so the process forks and clones with no other threads alive.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let exit_code = match run::execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            1
        }
    };

    process::exit(exit_code);
}
