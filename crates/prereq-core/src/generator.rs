//! Batch prerequisite generation.
//!
//! Asks an LLM, one question at a time, which concepts a math word problem
//! depends on. Calls are strictly sequential and spaced by a fixed delay to
//! stay under provider rate limits. A question whose call fails is recorded
//! with the `Error` sentinel and the batch moves on.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::model::serialize_list;
use crate::traits::{GenerateRequest, LlmProvider};

/// Recorded when the model says no math concept is needed.
pub const NONE_SENTINEL: &str = "None";
/// Recorded when no answer could be obtained for a question.
pub const ERROR_SENTINEL: &str = "Error";

/// Upper bound on any single retry wait, including server retry-after hints.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

const PROMPT_TEMPLATE: &str = r#"
You are an expert math educator. Given the following math word problem, identify the key mathematical concepts or reasoning skills that are essential to solve it.

Problem:
{question}

Instructions:
- List 3 to 5 high-level but specific mathematical concepts required to solve the problem
- Avoid vague terms like "Arithmetic" and use terms such as Addition, Subtraction, Multiplication, Division, Fractions, Estimation, Ratios, Word Problem Comprehension, etc.
- Avoid overly detailed techniques or procedural steps
- Only include concepts that are genuinely essential
- Return the concepts as a comma-separated list (e.g., "Addition, Subtraction, Multiplication")
- Do not include numbering or explanations, just the concepts
- If no math concepts are required, return "None"

Essential Prerequisites:"#;

/// Fill the prompt template for one question.
pub fn build_prompt(question: &str) -> String {
    PROMPT_TEMPLATE.replace("{question}", question)
}

/// Parse a model reply into a concept list.
pub fn parse_prerequisites(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return vec![NONE_SENTINEL.to_string()];
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration for a generation batch.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Max tokens for each reply.
    pub max_tokens: u32,
    /// Pause between consecutive questions.
    pub delay: Duration,
    /// Retries on transient provider errors.
    pub max_retries: u32,
    /// Initial backoff between retries.
    pub retry_delay: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            max_tokens: 256,
            delay: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// One output row: a question and its generated prerequisites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedRow {
    pub question: String,
    #[serde(serialize_with = "serialize_list")]
    pub prerequisites: Vec<String>,
}

impl GeneratedRow {
    pub fn is_error(&self) -> bool {
        self.prerequisites.len() == 1 && self.prerequisites[0] == ERROR_SENTINEL
    }
}

/// Result of a whole batch.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub rows: Vec<GeneratedRow>,
    pub failed: usize,
    pub duration: Duration,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_question_start(&self, index: usize, total: usize);
    fn on_question_complete(&self, index: usize, row: &GeneratedRow);
    fn on_question_error(&self, index: usize, error: &str);
    fn on_batch_complete(&self, total: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_question_start(&self, _: usize, _: usize) {}
    fn on_question_complete(&self, _: usize, _: &GeneratedRow) {}
    fn on_question_error(&self, _: usize, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: Duration) {}
}

/// Sequential prerequisite generator over a single provider.
pub struct PrerequisiteGenerator {
    provider: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl PrerequisiteGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { provider, config }
    }

    /// Generate prerequisites for every question, in order.
    pub async fn run(
        &self,
        questions: &[String],
        progress: &dyn ProgressReporter,
    ) -> GenerationReport {
        let start = Instant::now();
        let total = questions.len();
        let mut rows = Vec::with_capacity(total);
        let mut failed = 0usize;

        for (index, question) in questions.iter().enumerate() {
            if index > 0 && !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
            progress.on_question_start(index, total);

            let prerequisites = match self.generate_one(question).await {
                Ok(list) => list,
                Err(e) => {
                    warn!(index, provider = self.provider.name(), "generation failed: {e:#}");
                    progress.on_question_error(index, &format!("{e:#}"));
                    failed += 1;
                    vec![ERROR_SENTINEL.to_string()]
                }
            };

            let row = GeneratedRow {
                question: question.clone(),
                prerequisites,
            };
            progress.on_question_complete(index, &row);
            rows.push(row);
        }

        let duration = start.elapsed();
        progress.on_batch_complete(total, failed, duration);
        GenerationReport {
            rows,
            failed,
            duration,
        }
    }

    /// One question, retrying transient provider errors with backoff.
    async fn generate_one(&self, question: &str) -> Result<Vec<String>> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: build_prompt(question),
            system_prompt: None,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut last_error = None;
        let mut retry_delay = self.config.retry_delay;
        for retry in 0..=self.config.max_retries {
            if retry > 0 {
                tokio::time::sleep(retry_delay.min(MAX_RETRY_DELAY)).await;
                retry_delay = retry_delay.saturating_mul(2).min(MAX_RETRY_DELAY);
            }
            match self.provider.generate(&request).await {
                Ok(response) => {
                    debug!(
                        model = %response.model,
                        latency_ms = response.latency_ms,
                        tokens = response.token_usage.total_tokens,
                        "generated prerequisites"
                    );
                    return Ok(parse_prerequisites(&response.content));
                }
                Err(e) => {
                    if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                        if provider_err.is_permanent() {
                            return Err(e);
                        }
                        if let Some(ms) = provider_err.retry_after_ms() {
                            retry_delay = Duration::from_millis(ms).min(MAX_RETRY_DELAY);
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
    }
}

// ---------------------------------------------------------------------------
// Input and output files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuestionLine {
    question: String,
}

/// Read up to `limit` questions from a `.jsonl` or `.csv` file.
pub fn load_questions(path: &Path, limit: usize) -> Result<Vec<String>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let questions = match extension.as_str() {
        "jsonl" => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read questions: {}", path.display()))?;
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .take(limit)
                .enumerate()
                .map(|(i, line)| {
                    serde_json::from_str::<QuestionLine>(line)
                        .map(|q| q.question)
                        .with_context(|| {
                            format!("{}:{}: invalid question line", path.display(), i + 1)
                        })
                })
                .collect::<Result<Vec<_>>>()?
        }
        "csv" => {
            let mut reader = csv::Reader::from_path(path)
                .with_context(|| format!("failed to read questions: {}", path.display()))?;
            reader
                .deserialize::<QuestionLine>()
                .take(limit)
                .map(|row| row.map(|q| q.question))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("failed to parse questions: {}", path.display()))?
        }
        other => anyhow::bail!(
            "unsupported question file '{}' (extension '{other}'), expected .jsonl or .csv",
            path.display()
        ),
    };

    Ok(questions)
}

/// Write generated rows as `question,prerequisites` CSV.
pub fn write_generated(path: &Path, rows: &[GeneratedRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create output: {}", path.display()))?;
    if rows.is_empty() {
        writer.write_record(["question", "prerequisites"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
