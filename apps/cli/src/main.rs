//! kbsync CLI: mirror a markdown documentation tree into a hosted knowledge
//! base.
//!
//! Reads a list of changed files (from a file or `git diff`), creates the
//! matching category/article hierarchy remotely, and removes categories whose
//! source directories are gone.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
