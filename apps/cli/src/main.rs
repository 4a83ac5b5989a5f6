//! firmfacts CLI — company-domain enrichment from public sources.
//!
//! Creates enrichment jobs, watches their progress, and lists the
//! extracted facts.

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
