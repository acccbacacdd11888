//! The `prereq annotate` command.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use prereq_core::dataset::load_dataset;
use prereq_core::ledger::ProgressLedger;
use prereq_core::model::{AnnotatorId, QuestionRecord};
use prereq_core::session::{AnnotationSession, Progress};
use prereq_core::similarity::SimilarityScorer;
use prereq_providers::config::load_config_from;
use prereq_providers::create_embedder;

pub async fn execute(
    data: Option<PathBuf>,
    ledger_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let data = data.unwrap_or(config.data_file);
    let ledger_dir = ledger_dir.unwrap_or(config.ledger_dir);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout().lock();

    let Some(annotator) = prompt_identity(&mut input, &mut out)? else {
        return Ok(());
    };

    let (dataset, stats) = load_dataset(&data)?;
    if dataset.is_empty() {
        warn!(
            path = %data.display(),
            excluded = stats.excluded,
            "dataset has no annotatable questions"
        );
    }

    let embedder = create_embedder(&config.embedding)?;
    let scorer = SimilarityScorer::initialize(embedder).await?;

    let ledger = ProgressLedger::open(&ledger_dir, annotator);
    let mut session = AnnotationSession::resume(dataset, ledger, scorer)?;

    run_session(&mut session, &mut input, &mut out).await
}

/// Ask for an annotator name until a valid one is given. `None` on EOF.
fn prompt_identity<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
) -> Result<Option<AnnotatorId>> {
    loop {
        write!(out, "Enter your annotator name: ")?;
        out.flush()?;
        let Some(line) = read_line(input)? else {
            return Ok(None);
        };
        match line.parse::<AnnotatorId>() {
            Ok(id) => return Ok(Some(id)),
            Err(e) => writeln!(out, "{e}")?,
        }
    }
}

/// Drive the session until every question is done or the annotator quits.
pub async fn run_session<R: BufRead, W: Write>(
    session: &mut AnnotationSession,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    writeln!(
        out,
        "Annotating as {}. Ledger: {}",
        session.annotator(),
        session.ledger().path().display()
    )?;

    while let Some(record) = session.current().cloned() {
        show_question(out, &record, session.progress())?;

        let Some(selected) = prompt_selection(input, out, &record)? else {
            writeln!(out, "{}. Goodbye.", session.progress())?;
            return Ok(());
        };

        let entry = session
            .submit(&record.id, &selected)
            .await
            .with_context(|| format!("failed to record annotation for '{}'", record.id))?;
        writeln!(
            out,
            "Saved. Similarity to the model's suggestion: {:.3}",
            entry.similarity_score
        )?;
    }

    writeln!(out, "{}", session.progress())?;
    writeln!(out, "All questions have been annotated.")?;
    Ok(())
}

fn show_question<W: Write>(out: &mut W, record: &QuestionRecord, progress: Progress) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{progress}")?;
    writeln!(out, "Question [{}]:", record.id)?;
    writeln!(out, "{}", record.question_text)?;
    writeln!(out)?;
    writeln!(out, "Correct answer: {}", record.correct_answer)?;
    writeln!(out, "Wrong answer: {}", record.wrong_answer)?;
    writeln!(
        out,
        "Model's suggested missing prerequisite: {}",
        record.model_suggested_prerequisite
    )?;
    writeln!(out, "Candidate prerequisites:")?;
    for (i, candidate) in record.candidate_prerequisites.iter().enumerate() {
        writeln!(out, "  {:>2}. {candidate}", i + 1)?;
    }
    Ok(())
}

/// Read a selection for `record`. `None` means the annotator quit.
fn prompt_selection<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    record: &QuestionRecord,
) -> Result<Option<Vec<String>>> {
    let count = record.candidate_prerequisites.len();
    loop {
        write!(out, "Select prerequisites (e.g. 1,3), or q to quit: ")?;
        out.flush()?;
        let Some(line) = read_line(input)? else {
            return Ok(None);
        };
        if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
            return Ok(None);
        }

        let indices = match parse_selection(&line, count) {
            Ok(indices) => indices,
            Err(msg) => {
                writeln!(out, "{msg}")?;
                continue;
            }
        };

        if indices.is_empty() {
            write!(out, "No prerequisite selected. Submit anyway? [y/N] ")?;
            out.flush()?;
            let Some(answer) = read_line(input)? else {
                return Ok(None);
            };
            if !matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
                continue;
            }
        }

        return Ok(Some(
            indices
                .into_iter()
                .map(|i| record.candidate_prerequisites[i].clone())
                .collect(),
        ));
    }
}

/// Parse 1-based candidate numbers separated by commas or spaces.
///
/// Returns 0-based indices without repeats, in entry order.
fn parse_selection(line: &str, count: usize) -> std::result::Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for token in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let n: usize = token.parse().map_err(|_| {
            format!("'{token}' is not a number. Enter numbers between 1 and {count}.")
        })?;
        if n == 0 || n > count {
            return Err(format!(
                "{n} is out of range. Enter numbers between 1 and {count}."
            ));
        }
        if !indices.contains(&(n - 1)) {
            indices.push(n - 1);
        }
    }
    Ok(indices)
}

/// One trimmed line, or `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).context("failed to read input")? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
