//! Evaluation command

use crate::app::{EvalArgs, OutputFormat};
use crate::output;
use anyhow::{Context, Result};
use ragcite_core::error::exit_codes;
use ragcite_core::eval::{load_report, save_report};
use ragcite_core::{compare, CompareOptions, Config, RagEngine};

pub async fn run(args: EvalArgs, config: Config, format: OutputFormat) -> Result<i32> {
    let options = CompareOptions::from(&config.eval);
    // Load the baseline first so a bad path fails before the run
    let baseline = match &args.baseline {
        Some(path) => Some(
            load_report(path).with_context(|| format!("loading baseline {}", path.display()))?,
        ),
        None => None,
    };

    let engine = RagEngine::open_for_serving(config)?;
    let report = engine
        .run_evaluation(&args.test_set, args.k.as_deref())
        .await?;
    engine.close();

    if let Some(path) = &args.output {
        save_report(path, &report)?;
        tracing::info!(path = %path.display(), "Saved evaluation report");
    }

    let Some(baseline) = baseline else {
        print!("{}", output::format_report(&report, format));
        return Ok(exit_codes::SUCCESS);
    };

    let regressions = compare(&baseline, &report, options);
    match format {
        OutputFormat::Json => {
            print!(
                "{}",
                output::json::to_pretty(&serde_json::json!({
                    "report": report,
                    "regressions": regressions,
                }))
            );
        }
        OutputFormat::Cli => {
            print!("{}", output::format_report(&report, format));
            println!();
            print!("{}", output::format_regressions(&regressions, format));
        }
    }

    Ok(if regressions.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::REGRESSION
    })
}
