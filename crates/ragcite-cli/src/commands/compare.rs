//! Compare two saved evaluation reports

use crate::app::{CompareArgs, OutputFormat};
use crate::output;
use anyhow::{Context, Result};
use ragcite_core::error::exit_codes;
use ragcite_core::eval::load_report;
use ragcite_core::{compare, CompareOptions, Config};

pub fn run(args: CompareArgs, config: &Config, format: OutputFormat) -> Result<i32> {
    let baseline = load_report(&args.baseline)
        .with_context(|| format!("loading baseline {}", args.baseline.display()))?;
    let current = load_report(&args.current)
        .with_context(|| format!("loading report {}", args.current.display()))?;

    let regressions = compare(&baseline, &current, CompareOptions::from(&config.eval));
    print!("{}", output::format_regressions(&regressions, format));

    Ok(if regressions.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::REGRESSION
    })
}
