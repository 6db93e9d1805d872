//! Status command

use crate::app::OutputFormat;
use crate::output;
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagEngine};

pub fn run(config: Config, format: OutputFormat) -> Result<i32> {
    let engine = RagEngine::open(config)?;
    let status = engine.status()?;
    print!("{}", output::format_status(&status, format));
    engine.close();
    Ok(exit_codes::SUCCESS)
}
