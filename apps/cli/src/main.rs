//! StudyKit CLI — bilingual study documents from captured exam discussions.
//!
//! Reads a capture file, classifies disputed questions, translates each
//! question and adds AI explanations where the run mode asks for them.

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
