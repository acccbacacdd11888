//! Per-annotator progress ledger.
//!
//! Each annotator owns one append-only CSV file. The header is written on
//! the first append only, so a relaunch keeps appending to the same file
//! and resumes from the ids already recorded there.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::LedgerError;
use crate::model::{AnnotationEntry, AnnotatorId};

/// File name prefix shared by every ledger; the merge utility globs on it.
pub const LEDGER_PREFIX: &str = "annotations_";
/// File name extension of every ledger.
pub const LEDGER_EXTENSION: &str = "csv";

/// Deterministic ledger file name for an annotator.
pub fn ledger_file_name(annotator: &AnnotatorId) -> String {
    format!("{LEDGER_PREFIX}{annotator}.{LEDGER_EXTENSION}")
}

/// The durable log of one annotator's submissions.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    annotator: AnnotatorId,
    path: PathBuf,
}

impl ProgressLedger {
    /// Point a ledger at `dir`. Nothing is created until the first append.
    pub fn open(dir: &Path, annotator: AnnotatorId) -> Self {
        let path = dir.join(ledger_file_name(&annotator));
        Self { annotator, path }
    }

    pub fn annotator(&self) -> &AnnotatorId {
        &self.annotator
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order. A missing file is an empty ledger.
    pub fn entries(&self) -> Result<Vec<AnnotationEntry>, LedgerError> {
        read_entries(&self.path)
    }

    /// Ids of every question already annotated.
    pub fn load(&self) -> Result<HashSet<String>, LedgerError> {
        let completed: HashSet<String> = self
            .entries()?
            .into_iter()
            .map(|entry| entry.question_id)
            .collect();
        info!(
            annotator = %self.annotator,
            path = %self.path.display(),
            completed = completed.len(),
            "loaded progress ledger"
        );
        Ok(completed)
    }

    /// Append one entry and sync it to disk before returning.
    pub fn append(&self, entry: &AnnotationEntry) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(entry).map_err(|source| LedgerError::Csv {
            path: self.path.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_data().map_err(io_err)?;

        debug!(
            annotator = %self.annotator,
            question_id = %entry.question_id,
            score = entry.similarity_score,
            "appended ledger entry"
        );
        Ok(())
    }
}

/// Read every entry of a ledger file. A missing file yields no entries.
pub fn read_entries(path: &Path) -> Result<Vec<AnnotationEntry>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path).map_err(|source| LedgerError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    reader
        .deserialize::<AnnotationEntry>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        })
}
