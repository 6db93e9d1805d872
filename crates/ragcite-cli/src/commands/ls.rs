//! List command

use crate::app::OutputFormat;
use crate::output;
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagEngine};

pub fn run(config: Config, format: OutputFormat) -> Result<i32> {
    let engine = RagEngine::open(config)?;
    let docs = engine.list_documents()?;
    print!("{}", output::format_documents(&docs, format));
    engine.close();
    Ok(exit_codes::SUCCESS)
}
