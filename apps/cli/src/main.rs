//! hottake CLI: turn a news article into a streamed hot-take analysis.
//!
//! Runs the analysis pipeline in-process, watches a run on a remote server,
//! or serves the streaming HTTP API.

mod commands;
mod render;

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
