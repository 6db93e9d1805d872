//! Query command

use crate::app::{OutputFormat, QueryArgs};
use crate::output;
use anyhow::Result;
use ragcite_core::error::exit_codes;
use ragcite_core::{Config, RagEngine};

pub async fn run(args: QueryArgs, config: Config, format: OutputFormat) -> Result<i32> {
    let top_k = args.top_k.unwrap_or(config.retrieval.top_k);
    let query = args.query.join(" ");
    let engine = RagEngine::open_for_serving(config)?;

    if args.retrieve_only {
        let candidates = engine.retrieve(&query, top_k).await?;
        print!("{}", output::format_candidates(&candidates, format));
    } else {
        let answer = engine
            .query_with_session(&query, top_k, args.session.as_deref())
            .await?;
        match format {
            OutputFormat::Json => print!("{}", output::json::format_answer(&answer)),
            OutputFormat::Cli => output::terminal::print_answer(&answer)?,
        }
    }

    engine.close();
    Ok(exit_codes::SUCCESS)
}
