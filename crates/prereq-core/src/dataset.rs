//! Question dataset loading.
//!
//! Loads the annotation source CSV into an immutable, ordered [`Dataset`].
//! Rows without a model suggestion or without usable candidate
//! prerequisites are filtered out rather than treated as errors.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::DataLoadError;
use crate::model::{parse_prerequisite_list, QuestionRecord};

/// Columns that must be present in the source header.
pub const REQUIRED_COLUMNS: [&str; 4] = [
    "question_id",
    "question",
    "missing_prerequisite",
    "all_prerequisites",
];

/// Intermediate CSV row before validation.
#[derive(Debug, Deserialize)]
struct RawQuestionRow {
    question_id: String,
    question: String,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    wrong_answer: Option<String>,
    #[serde(default)]
    missing_prerequisite: Option<String>,
    #[serde(default)]
    all_prerequisites: Option<String>,
}

/// Row accounting for a single load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    pub total_rows: usize,
    pub retained: usize,
    pub excluded: usize,
}

/// An immutable, ordered collection of questions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<QuestionRecord>,
    index: HashMap<String, usize>,
}

impl Dataset {
    /// Build a dataset from already-validated records.
    pub fn from_records(records: Vec<QuestionRecord>) -> Result<Self, DataLoadError> {
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), pos).is_some() {
                return Err(DataLoadError::DuplicateId(record.id.clone()));
            }
        }
        Ok(Self { records, index })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&QuestionRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Records in their stored order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.records.iter()
    }
}

/// Load a dataset from a CSV file.
pub fn load_dataset(path: &Path) -> Result<(Dataset, LoadStats), DataLoadError> {
    let file = std::fs::File::open(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_dataset_from_reader(file, path)
}

/// Load a dataset from any reader (useful for testing).
pub fn load_dataset_from_reader<R: Read>(
    reader: R,
    source_path: &Path,
) -> Result<(Dataset, LoadStats), DataLoadError> {
    let csv_err = |source| DataLoadError::Csv {
        path: source_path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);

    let headers = reader.headers().map_err(csv_err)?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DataLoadError::MissingColumn {
                path: source_path.to_path_buf(),
                column,
            });
        }
    }

    let mut stats = LoadStats::default();
    let mut records = Vec::new();

    for (row, result) in reader.deserialize::<RawQuestionRow>().enumerate() {
        let raw = result.map_err(csv_err)?;
        stats.total_rows += 1;

        let Some(record) = validate_row(raw, row + 1)? else {
            stats.excluded += 1;
            continue;
        };
        records.push(record);
        stats.retained += 1;
    }

    let dataset = Dataset::from_records(records)?;
    info!(
        path = %source_path.display(),
        total = stats.total_rows,
        retained = stats.retained,
        excluded = stats.excluded,
        "loaded dataset"
    );
    Ok((dataset, stats))
}

/// Turn a raw row into a record, or `None` if the row is filtered out.
fn validate_row(raw: RawQuestionRow, row: usize) -> Result<Option<QuestionRecord>, DataLoadError> {
    let suggestion = non_empty(raw.missing_prerequisite);
    let candidates = non_empty(raw.all_prerequisites)
        .map(|all| parse_prerequisite_list(&all))
        .unwrap_or_default();

    let Some(suggestion) = suggestion else {
        debug!(row, id = %raw.question_id, "dropping row without model suggestion");
        return Ok(None);
    };
    if candidates.is_empty() {
        debug!(row, id = %raw.question_id, "dropping row without candidate prerequisites");
        return Ok(None);
    }

    let id = raw.question_id.trim().to_string();
    if id.is_empty() {
        return Err(DataLoadError::EmptyId { row });
    }

    Ok(Some(QuestionRecord {
        id,
        question_text: raw.question,
        correct_answer: raw.correct_answer.unwrap_or_default(),
        wrong_answer: raw.wrong_answer.unwrap_or_default(),
        model_suggested_prerequisite: suggestion,
        candidate_prerequisites: candidates,
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
