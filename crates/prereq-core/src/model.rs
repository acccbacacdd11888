//! Core data model types for prereq.
//!
//! Questions are loaded once and never mutated; annotations are written
//! once and never revised.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LedgerError;

/// Separator used whenever a prerequisite list is flattened into one field.
pub const PREREQUISITE_SEPARATOR: &str = ", ";

/// A single question shown to an annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Stable key, unique within a dataset.
    pub id: String,
    pub question_text: String,
    pub correct_answer: String,
    pub wrong_answer: String,
    /// The concept a model proposed as the missing prerequisite.
    pub model_suggested_prerequisite: String,
    /// Concepts the annotator can choose from, in source order.
    pub candidate_prerequisites: Vec<String>,
}

impl QuestionRecord {
    /// Returns `true` if `prerequisite` is one of this question's candidates.
    pub fn has_candidate(&self, prerequisite: &str) -> bool {
        self.candidate_prerequisites.iter().any(|c| c == prerequisite)
    }
}

/// One submitted annotation, as stored in a ledger row.
///
/// Field names follow the ledger's column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub question_id: String,
    #[serde(
        rename = "human_selected_prerequisite",
        serialize_with = "serialize_list",
        deserialize_with = "deserialize_list"
    )]
    pub selected_prerequisites: Vec<String>,
    #[serde(rename = "gemma_missing_prerequisite")]
    pub model_suggested_prerequisite: String,
    #[serde(serialize_with = "serialize_score")]
    pub similarity_score: f64,
    pub annotator: String,
}

pub(crate) fn serialize_list<S: Serializer>(
    list: &[String],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&list.join(PREREQUISITE_SEPARATOR))
}

fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(parse_prerequisite_list(&raw))
}

fn serialize_score<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{score:.3}"))
}

/// Split a comma-delimited prerequisite field.
///
/// Entries are trimmed, empty entries dropped, and repeated entries kept
/// only at their first position.
pub fn parse_prerequisite_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() || out.iter().any(|p| p == part) {
            continue;
        }
        out.push(part.to_string());
    }
    out
}

/// A validated annotator identity.
///
/// The identity becomes part of a file name, so it may not contain
/// whitespace, path separators or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotatorId(String);

impl AnnotatorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AnnotatorId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let valid = !name.is_empty()
            && !name.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\')
            && !name.contains("..");
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(LedgerError::InvalidIdentity(s.to_string()))
        }
    }
}

impl fmt::Display for AnnotatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
