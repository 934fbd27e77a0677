//! LeadFlow CLI — concurrent batch lead enrichment.
//!
//! Submits five-file CSV batches for staged LLM enrichment and inspects
//! the durable progress and intel stores.

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
