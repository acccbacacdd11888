//! The `prereq merge` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use prereq_core::merge::merge_ledgers;
use prereq_providers::config::load_config_from;

pub fn execute(
    dir: Option<PathBuf>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => load_config_from(config_path.as_deref())?.ledger_dir,
    };
    let output = output.unwrap_or_else(|| {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        PathBuf::from(format!("annotations-merged-{timestamp}.csv"))
    });

    let summary = merge_ledgers(&dir, &output)?;

    let mut table = Table::new();
    table.set_header(vec!["Ledger", "Rows"]);
    for file in &summary.files {
        table.add_row(vec![Cell::new(file.path.display()), Cell::new(file.rows)]);
    }
    println!("{table}");
    println!(
        "Merged {} rows from {} files into {}",
        summary.total_rows,
        summary.files.len(),
        summary.output.display()
    );

    Ok(())
}
