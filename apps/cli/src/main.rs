//! LessonForge CLI: turn source texts into structured language lessons.
//!
//! Reads a source text, generates every section of the requested lesson
//! type and writes the finished lesson as JSON.

mod collab;
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
