use anyhow::{Context, Result};

use cowatch::bootstrap;
use cowatch::io::{input_reader, read_memberships, read_suggestion_lines};
use cowatch::metrics::evaluation_reporter::EvaluationReporter;

fn main() -> Result<()> {
    let config = bootstrap::init()?;

    // The suggestion file is the second argument, or the configured output
    let suggestions_path = std::env::args()
        .nth(2)
        .or_else(|| config.data.output_path.clone())
        .context("no suggestion file given")?;
    let holdout_path = config
        .data
        .holdout_path
        .as_deref()
        .context("data.holdout_path is required for evaluation")?;

    let suggestions = read_suggestion_lines(input_reader(Some(suggestions_path.as_str()))?)?;
    let holdout = read_memberships(holdout_path)?;

    let mut reporter = EvaluationReporter::new(config.model.num_items_to_recommend);
    reporter.evaluate(&suggestions, &holdout);

    println!("{}", reporter.get_name());
    println!("{}", reporter.result());
    Ok(())
}
