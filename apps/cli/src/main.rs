//! BCO-RAG CLI: generate BioCompute Object domains from a research paper.
//!
//! Indexes one paper, then generates the requested domains against it,
//! writing each answer under `{output_dir}/{paper}/`.

mod commands;
mod prompt;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = bcorag_shared::load_config()?;
    commands::init_tracing(&cli, &config);
    commands::run(cli, config).await
}
