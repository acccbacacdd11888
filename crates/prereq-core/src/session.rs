//! Annotation session controller.
//!
//! The session owns the dataset, the annotator's ledger, and the similarity
//! scorer. It walks the dataset in stored order, skipping every question the
//! ledger already holds, until nothing is left.

use std::collections::HashSet;
use std::fmt;

use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::error::{LedgerError, SessionError};
use crate::ledger::ProgressLedger;
use crate::model::{AnnotationEntry, AnnotatorId, QuestionRecord, PREREQUISITE_SEPARATOR};
use crate::similarity::SimilarityScorer;

/// Where the session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A question is on screen and waiting for a submission.
    AwaitingSelection { question_id: String },
    /// Every question in the dataset has been annotated.
    Exhausted,
}

/// Completed versus total questions for one annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Progress: {}/{} annotated", self.completed, self.total)
    }
}

/// One annotator's pass over a dataset.
pub struct AnnotationSession {
    dataset: Dataset,
    ledger: ProgressLedger,
    scorer: SimilarityScorer,
    completed_ids: HashSet<String>,
    state: SessionState,
}

impl AnnotationSession {
    /// Rebuild a session from whatever the ledger already holds.
    pub fn resume(
        dataset: Dataset,
        ledger: ProgressLedger,
        scorer: SimilarityScorer,
    ) -> Result<Self, LedgerError> {
        let completed_ids = ledger.load()?;

        let foreign = completed_ids
            .iter()
            .filter(|id| !dataset.contains(id))
            .count();
        if foreign > 0 {
            warn!(
                annotator = %ledger.annotator(),
                count = foreign,
                "ledger contains question ids that are not in the dataset"
            );
        }

        let mut session = Self {
            dataset,
            ledger,
            scorer,
            completed_ids,
            state: SessionState::Exhausted,
        };
        session.state = session.compute_state();
        info!(
            annotator = %session.ledger.annotator(),
            progress = %session.progress(),
            "session resumed"
        );
        Ok(session)
    }

    pub fn annotator(&self) -> &AnnotatorId {
        self.ledger.annotator()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == SessionState::Exhausted
    }

    pub fn is_completed(&self, question_id: &str) -> bool {
        self.completed_ids.contains(question_id)
    }

    /// First question in dataset order that has not been annotated.
    pub fn next_unlabeled(&self) -> Option<&QuestionRecord> {
        self.dataset
            .iter()
            .find(|record| !self.completed_ids.contains(&record.id))
    }

    /// The question currently awaiting a selection.
    pub fn current(&self) -> Option<&QuestionRecord> {
        match &self.state {
            SessionState::AwaitingSelection { question_id } => self.dataset.get(question_id),
            SessionState::Exhausted => None,
        }
    }

    pub fn progress(&self) -> Progress {
        let completed = self
            .dataset
            .iter()
            .filter(|r| self.completed_ids.contains(&r.id))
            .count();
        Progress {
            completed,
            total: self.dataset.len(),
        }
    }

    /// Record a selection for `question_id` and advance.
    ///
    /// Returns the entry written to the ledger; the new position is read
    /// through [`state`](Self::state). A failed append leaves the session
    /// unchanged.
    ///
    /// An empty selection is accepted; asking the annotator to confirm it is
    /// the caller's job. Selections are stored in candidate order.
    pub async fn submit(
        &mut self,
        question_id: &str,
        selected: &[String],
    ) -> Result<AnnotationEntry, SessionError> {
        if self.completed_ids.contains(question_id) {
            return Err(SessionError::AlreadyCompleted(question_id.to_string()));
        }
        let record = self
            .dataset
            .get(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;

        if let Some(unknown) = selected.iter().find(|s| !record.has_candidate(s)) {
            return Err(SessionError::UnknownPrerequisite {
                question_id: question_id.to_string(),
                prerequisite: unknown.clone(),
            });
        }
        let selected_prerequisites: Vec<String> = record
            .candidate_prerequisites
            .iter()
            .filter(|c| selected.contains(*c))
            .cloned()
            .collect();

        let human_text = selected_prerequisites.join(PREREQUISITE_SEPARATOR);
        let similarity_score = self
            .scorer
            .score(&record.model_suggested_prerequisite, &human_text)
            .await;

        let entry = AnnotationEntry {
            question_id: record.id.clone(),
            selected_prerequisites,
            model_suggested_prerequisite: record.model_suggested_prerequisite.clone(),
            similarity_score,
            annotator: self.ledger.annotator().to_string(),
        };

        self.ledger.append(&entry)?;
        self.completed_ids.insert(entry.question_id.clone());
        self.state = self.compute_state();

        info!(
            annotator = %entry.annotator,
            question_id = %entry.question_id,
            score = entry.similarity_score,
            progress = %self.progress(),
            "annotation recorded"
        );
        Ok(entry)
    }

    fn compute_state(&self) -> SessionState {
        match self.next_unlabeled() {
            Some(record) => SessionState::AwaitingSelection {
                question_id: record.id.clone(),
            },
            None => SessionState::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::similarity::HashingEmbedder;
    use crate::traits::Embedder;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("out of memory")
        }
    }

    fn record(id: &str, suggestion: &str, candidates: &[&str]) -> QuestionRecord {
        QuestionRecord {
            id: id.into(),
            question_text: format!("question {id}"),
            correct_answer: "4".into(),
            wrong_answer: "5".into(),
            model_suggested_prerequisite: suggestion.into(),
            candidate_prerequisites: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn three_questions() -> Dataset {
        Dataset::from_records(vec![
            record("q1", "Addition", &["Addition", "Counting"]),
            record("q2", "Division", &["Division", "Fractions", "Ratios"]),
            record("q3", "Ratios", &["Ratios", "Multiplication"]),
        ])
        .unwrap()
    }

    fn session_with(dir: &Path, embedder: Arc<dyn Embedder>) -> AnnotationSession {
        let ledger = ProgressLedger::open(dir, "alice".parse().unwrap());
        AnnotationSession::resume(three_questions(), ledger, SimilarityScorer::new(embedder))
            .unwrap()
    }

    fn session(dir: &Path) -> AnnotationSession {
        session_with(dir, Arc::new(HashingEmbedder::default()))
    }

    fn sel(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn next_unlabeled_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path());
        let first = s.next_unlabeled().unwrap().id.clone();
        let second = s.next_unlabeled().unwrap().id.clone();
        assert_eq!(first, "q1");
        assert_eq!(first, second);
        assert_eq!(
            s.state(),
            &SessionState::AwaitingSelection {
                question_id: "q1".into()
            }
        );
    }

    #[tokio::test]
    async fn submit_then_relaunch_resumes_at_same_question() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        assert_eq!(s.next_unlabeled().unwrap().id, "q1");

        let entry = s.submit("q1", &sel(&["Addition"])).await.unwrap();
        assert_eq!(entry.similarity_score, 1.0);
        assert!(s.is_completed("q1"));
        assert_eq!(s.next_unlabeled().unwrap().id, "q2");
        assert_eq!(s.current().unwrap().id, "q2");
        assert_eq!(
            s.state(),
            &SessionState::AwaitingSelection {
                question_id: "q2".into()
            }
        );

        let rows = s.ledger().entries().unwrap();
        assert_eq!(rows.iter().filter(|e| e.question_id == "q1").count(), 1);
        drop(s);

        let relaunched = session(dir.path());
        assert!(relaunched.is_completed("q1"));
        assert_eq!(relaunched.progress(), Progress { completed: 1, total: 3 });
        assert_eq!(relaunched.next_unlabeled().unwrap().id, "q2");
    }

    #[tokio::test]
    async fn submitted_question_is_never_offered_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.submit("q2", &sel(&["Fractions"])).await.unwrap();
        for _ in 0..3 {
            assert_ne!(s.next_unlabeled().unwrap().id, "q2");
        }
        s.submit("q1", &[]).await.unwrap();
        assert_eq!(s.next_unlabeled().unwrap().id, "q3");
    }

    #[tokio::test]
    async fn exhausts_after_last_question() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        for id in ["q1", "q2", "q3"] {
            assert!(!s.is_exhausted());
            let current = s.current().unwrap().id.clone();
            assert_eq!(current, id);
            s.submit(id, &[]).await.unwrap();
        }
        assert!(s.next_unlabeled().is_none());
        assert!(s.is_exhausted());
        assert!(s.current().is_none());
        assert_eq!(s.progress().to_string(), "Progress: 3/3 annotated");

        let relaunched = session(dir.path());
        assert_eq!(relaunched.state(), &SessionState::Exhausted);
    }

    #[tokio::test]
    async fn double_submit_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.submit("q1", &sel(&["Counting"])).await.unwrap();
        let err = s.submit("q1", &sel(&["Addition"])).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyCompleted(id) if id == "q1"));
        assert_eq!(s.ledger().entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_question_and_prerequisite_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        assert!(matches!(
            s.submit("q9", &[]).await,
            Err(SessionError::UnknownQuestion(_))
        ));
        assert!(matches!(
            s.submit("q1", &sel(&["Calculus"])).await,
            Err(SessionError::UnknownPrerequisite { .. })
        ));
        assert!(s.ledger().entries().unwrap().is_empty());
        assert!(!s.is_completed("q1"));
    }

    #[tokio::test]
    async fn failed_append_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("ledgers");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut s = session(&blocker);
        let err = s.submit("q1", &sel(&["Addition"])).await.unwrap_err();
        assert!(matches!(err, SessionError::Ledger(_)));
        assert!(!s.is_completed("q1"));
        assert_eq!(s.progress().completed, 0);
        assert_eq!(
            s.state(),
            &SessionState::AwaitingSelection {
                question_id: "q1".into()
            }
        );
    }

    #[tokio::test]
    async fn selection_is_stored_in_candidate_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let entry = s
            .submit("q2", &sel(&["Ratios", "Division", "Ratios"]))
            .await
            .unwrap();
        assert_eq!(entry.selected_prerequisites, vec!["Division", "Ratios"]);
        assert_eq!(entry.model_suggested_prerequisite, "Division");
        assert_eq!(entry.annotator, "alice");
    }

    #[tokio::test]
    async fn scorer_failure_still_appends_zero_score() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_with(dir.path(), Arc::new(FailingEmbedder));
        let entry = s.submit("q1", &sel(&["Addition"])).await.unwrap();
        assert_eq!(entry.similarity_score, 0.0);

        let rows = s.ledger().entries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].similarity_score, 0.0);
        assert_eq!(s.next_unlabeled().unwrap().id, "q2");
    }

    #[tokio::test]
    async fn foreign_ledger_ids_do_not_count_toward_progress() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::open(dir.path(), "alice".parse().unwrap());
        ledger
            .append(&AnnotationEntry {
                question_id: "old-7".into(),
                selected_prerequisites: vec![],
                model_suggested_prerequisite: "Addition".into(),
                similarity_score: 0.0,
                annotator: "alice".into(),
            })
            .unwrap();

        let s = session(dir.path());
        assert_eq!(s.progress().completed, 0);
        assert_eq!(s.next_unlabeled().unwrap().id, "q1");
    }
}
