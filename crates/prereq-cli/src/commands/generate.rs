//! The `prereq generate` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use prereq_core::generator::{
    load_questions, write_generated, GeneratedRow, PrerequisiteGenerator, ProgressReporter,
};
use prereq_core::model::PREREQUISITE_SEPARATOR;
use prereq_providers::config::load_config_from;
use prereq_providers::resolve_provider;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_question_start(&self, index: usize, total: usize) {
        eprintln!("  [{}/{total}] asking...", index + 1);
    }

    fn on_question_complete(&self, index: usize, row: &GeneratedRow) {
        eprintln!(
            "  [{}] {}",
            index + 1,
            row.prerequisites.join(PREREQUISITE_SEPARATOR)
        );
    }

    fn on_question_error(&self, index: usize, error: &str) {
        eprintln!("  ERROR [{}]: {error}", index + 1);
    }

    fn on_batch_complete(&self, total: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {}/{total} succeeded, {failed} failed ({:.1}s)",
            total - failed,
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    input: PathBuf,
    output: PathBuf,
    limit: Option<usize>,
    delay_ms: Option<u64>,
    provider_name: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let limit = limit.unwrap_or(config.generation.limit);
    anyhow::ensure!(limit >= 1, "limit must be at least 1");
    let provider_name = provider_name.unwrap_or_else(|| config.default_provider.clone());
    let model = model.unwrap_or_else(|| config.default_model.clone());

    let questions = load_questions(&input, limit)?;
    anyhow::ensure!(
        !questions.is_empty(),
        "no questions found in {}",
        input.display()
    );

    let provider = resolve_provider(&config, &provider_name)?;
    let mut generator_config = config.generator_config(&model);
    if let Some(ms) = delay_ms {
        generator_config.delay = Duration::from_millis(ms);
    }

    eprintln!(
        "Generating prerequisites for {} questions with {provider_name}/{model}",
        questions.len()
    );
    let report = PrerequisiteGenerator::new(provider, generator_config)
        .run(&questions, &ConsoleReporter)
        .await;

    write_generated(&output, &report.rows)?;
    println!("Saved results to {}", output.display());
    if report.failed > 0 {
        println!(
            "{} of {} questions failed and were recorded as Error",
            report.failed,
            report.rows.len()
        );
    }

    Ok(())
}
