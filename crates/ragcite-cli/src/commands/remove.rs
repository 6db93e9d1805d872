//! Remove command

use crate::app::{OutputFormat, RemoveArgs};
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagEngine};

pub fn run(args: RemoveArgs, config: Config, format: OutputFormat) -> Result<i32> {
    let engine = RagEngine::open(config)?;
    engine.remove_document(&args.document_id)?;
    engine.close();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "removed": args.document_id }));
        }
        OutputFormat::Cli => println!("Removed {}", args.document_id),
    }
    Ok(exit_codes::SUCCESS)
}
