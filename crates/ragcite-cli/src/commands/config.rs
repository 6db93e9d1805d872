//! Config command

use crate::app::{ConfigAction, ConfigArgs, OutputFormat};
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagError};
use std::path::Path;

const MASK: &str = "********";

pub fn run(
    args: ConfigArgs,
    config: &Config,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<i32> {
    match args.action {
        ConfigAction::Show => {
            let masked = masked(config);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&masked)?),
                OutputFormat::Cli => print!("{}", serde_yaml::to_string(&masked)?),
            }
        }
        ConfigAction::Init { force } => {
            let path = path.map_or_else(Config::default_path, Path::to_path_buf);
            if path.exists() && !force {
                return Err(RagError::InvalidInput(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ))
                .into());
            }
            // Keys stay in the environment
            let mut fresh = Config::default();
            fresh.llm.api_key = None;
            fresh.embedding.api_key = None;
            fresh.save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(exit_codes::SUCCESS)
}

fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(MASK.to_string());
    }
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some(MASK.to_string());
    }
    config
}
