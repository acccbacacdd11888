//! The `prereq status` command.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{Cell, Table};

use prereq_core::dataset::{load_dataset, Dataset};
use prereq_core::ledger::{read_entries, LEDGER_EXTENSION, LEDGER_PREFIX};
use prereq_core::merge::discover_ledgers;
use prereq_core::session::Progress;
use prereq_providers::config::load_config_from;

pub fn execute(
    data: Option<PathBuf>,
    ledger_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let data = data.unwrap_or(config.data_file);
    let ledger_dir = ledger_dir.unwrap_or(config.ledger_dir);

    let (dataset, stats) = load_dataset(&data)?;
    println!(
        "Dataset: {} ({} questions, {} rows excluded)",
        data.display(),
        dataset.len(),
        stats.excluded
    );

    let ledgers = discover_ledgers(&ledger_dir)?;
    if ledgers.is_empty() {
        println!("No annotation ledgers found in {}.", ledger_dir.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Annotator", "Completed", "Total", "Done %", "Ledger"]);
    for path in &ledgers {
        let progress = ledger_progress(&dataset, path)?;
        let percent = if progress.total == 0 {
            0.0
        } else {
            progress.completed as f64 / progress.total as f64 * 100.0
        };
        table.add_row(vec![
            Cell::new(annotator_name(path)),
            Cell::new(progress.completed),
            Cell::new(progress.total),
            Cell::new(format!("{percent:.1}%")),
            Cell::new(path.display()),
        ]);
    }

    println!("{table}");
    Ok(())
}

/// Distinct dataset questions present in one ledger.
fn ledger_progress(dataset: &Dataset, path: &Path) -> Result<Progress> {
    let ids: HashSet<String> = read_entries(path)?
        .into_iter()
        .map(|e| e.question_id)
        .filter(|id| dataset.contains(id))
        .collect();
    Ok(Progress {
        completed: ids.len(),
        total: dataset.len(),
    })
}

fn annotator_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_name
        .strip_prefix(LEDGER_PREFIX)
        .and_then(|rest| rest.strip_suffix(&format!(".{LEDGER_EXTENSION}")))
        .map(str::to_string)
        .unwrap_or(file_name)
}
