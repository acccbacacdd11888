//! Merge every annotator's ledger into one file.
//!
//! Rows are concatenated in file-name order, each file keeping its own row
//! order. Nothing is deduplicated: two annotators labeling the same question
//! produce two rows.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::info;

use crate::error::MergeError;
use crate::ledger::{LEDGER_EXTENSION, LEDGER_PREFIX};

/// Column names every ledger starts with.
pub const LEDGER_HEADER: [&str; 5] = [
    "question_id",
    "human_selected_prerequisite",
    "gemma_missing_prerequisite",
    "similarity_score",
    "annotator",
];

/// Rows contributed by one ledger file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub files: Vec<MergedFile>,
    pub total_rows: usize,
    pub output: PathBuf,
}

/// Glob pattern matching every ledger in `dir`.
pub fn ledger_pattern(dir: &Path) -> String {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    format!("{escaped}/{LEDGER_PREFIX}*.{LEDGER_EXTENSION}")
}

/// Ledger files in `dir`, sorted by name.
pub fn discover_ledgers(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut files: Vec<PathBuf> = glob::glob(&ledger_pattern(dir))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Concatenate all ledgers found in `dir` and write them to `output`.
///
/// Rows are copied verbatim. An `output` that is one of the ledgers being
/// merged is rejected, since writing it would destroy that annotator's work.
pub fn merge_ledgers(dir: &Path, output: &Path) -> Result<MergeSummary, MergeError> {
    let ledgers = discover_ledgers(dir)?;

    if let Ok(output_canonical) = output.canonicalize() {
        let clobbers = ledgers
            .iter()
            .any(|p| p.canonicalize().ok().as_ref() == Some(&output_canonical));
        if clobbers {
            return Err(MergeError::OutputIsLedger(output.to_path_buf()));
        }
    }

    if ledgers.is_empty() {
        return Err(MergeError::NoLedgers(ledger_pattern(dir)));
    }

    let mut rows: Vec<StringRecord> = Vec::new();
    let mut files = Vec::with_capacity(ledgers.len());
    for path in ledgers {
        let records = read_records(&path)?;
        files.push(MergedFile {
            path,
            rows: records.len(),
        });
        rows.extend(records);
    }

    write_records(output, &rows)?;

    let summary = MergeSummary {
        total_rows: rows.len(),
        files,
        output: output.to_path_buf(),
    };
    info!(
        files = summary.files.len(),
        rows = summary.total_rows,
        output = %output.display(),
        "merged ledgers"
    );
    Ok(summary)
}

/// Raw data rows of one ledger, after checking its header. An empty file has none.
fn read_records(path: &Path) -> Result<Vec<StringRecord>, MergeError> {
    let csv_err = |source| MergeError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let header = reader.headers().map_err(csv_err)?.clone();
    if header.is_empty() {
        return Ok(Vec::new());
    }
    if !header.iter().eq(LEDGER_HEADER.iter().copied()) {
        return Err(MergeError::HeaderMismatch {
            path: path.to_path_buf(),
            found: header.iter().collect::<Vec<_>>().join(","),
        });
    }

    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)
}

/// Write rows under a single header, replacing `output`.
fn write_records(output: &Path, rows: &[StringRecord]) -> Result<(), MergeError> {
    let csv_err = |source| MergeError::Csv {
        path: output.to_path_buf(),
        source,
    };
    let io_err = |source| MergeError::Io {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut writer = csv::Writer::from_path(output).map_err(csv_err)?;
    writer.write_record(LEDGER_HEADER).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}
