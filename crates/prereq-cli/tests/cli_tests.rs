//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const DATASET: &str = "\
question_id,question,correct_answer,wrong_answer,missing_prerequisite,all_prerequisites
q1,Tom has 3 apples and gets 2 more. How many apples does he have?,5,6,Addition,\"Addition, Counting\"
q2,What is half of 10?,5,2,Fractions,\"Fractions, Division\"
q3,A row without a suggestion,1,2,,Addition
";

const LEDGER_HEADER: &str =
    "question_id,human_selected_prerequisite,gemma_missing_prerequisite,similarity_score,annotator\n";

/// A command isolated from any config in the developer's home directory.
fn prereq(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("prereq").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("data.csv"), DATASET).unwrap();
    dir
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    prereq(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created prereq.toml"));
    assert!(dir.path().join("prereq.toml").exists());

    prereq(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn annotate_full_session() {
    let dir = workspace();

    prereq(dir.path())
        .args(["annotate", "--data", "data.csv", "--ledger-dir", "."])
        .write_stdin("alice\n1\n1 2\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress: 0/2 annotated"))
        .stdout(predicate::str::contains("Question [q2]"))
        .stdout(predicate::str::contains("All questions have been annotated."));

    let ledger = std::fs::read_to_string(dir.path().join("annotations_alice.csv")).unwrap();
    assert!(ledger.starts_with(LEDGER_HEADER));
    assert_eq!(ledger.matches("question_id").count(), 1);
    assert!(ledger.contains("q1,Addition,Addition,1.000,alice"));
    assert!(ledger.contains("q2,\"Fractions, Division\",Fractions,"));
}

#[test]
fn annotate_resumes_after_quit() {
    let dir = workspace();

    prereq(dir.path())
        .args(["annotate", "--data", "data.csv"])
        .write_stdin("bob\n2\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress: 1/2 annotated. Goodbye."));

    prereq(dir.path())
        .args(["annotate", "--data", "data.csv"])
        .write_stdin("bob\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Question [q2]"))
        .stdout(predicate::str::contains("Question [q1]").not());
}

#[test]
fn annotate_rejects_invalid_identity() {
    let dir = workspace();

    prereq(dir.path())
        .args(["annotate", "--data", "data.csv"])
        .write_stdin("../evil\ncarol\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("invalid annotator name"));

    assert!(!dir.path().join("annotations_carol.csv").exists());
}

#[test]
fn annotate_empty_selection_needs_confirmation() {
    let dir = workspace();

    prereq(dir.path())
        .args(["annotate", "--data", "data.csv"])
        .write_stdin("dave\n\nn\n\ny\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "No prerequisite selected. Submit anyway? [y/N]",
        ));

    let ledger = std::fs::read_to_string(dir.path().join("annotations_dave.csv")).unwrap();
    assert!(ledger.contains("q1,,Addition,"));
    assert_eq!(ledger.lines().count(), 2);
}

#[test]
fn annotate_missing_dataset_is_fatal() {
    let dir = TempDir::new().unwrap();

    prereq(dir.path())
        .args(["annotate", "--data", "nonexistent.csv"])
        .write_stdin("alice\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("nonexistent.csv"));
}

#[test]
fn status_lists_annotators() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("annotations_alice.csv"),
        format!("{LEDGER_HEADER}q1,Addition,Addition,1.000,alice\n"),
    )
    .unwrap();

    prereq(dir.path())
        .args(["status", "--data", "data.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 questions, 1 rows excluded"))
        .stdout(predicate::str::contains("alice"))
        .stdout(predicate::str::contains("50.0%"));
}

#[test]
fn merge_concatenates_ledgers() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("annotations_alice.csv"),
        format!(
            "{LEDGER_HEADER}q1,Addition,Addition,1.000,alice\nq2,Fractions,Fractions,1.000,alice\n"
        ),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("annotations_bob.csv"),
        format!("{LEDGER_HEADER}q1,Counting,Addition,0.120,bob\n"),
    )
    .unwrap();

    prereq(dir.path())
        .args(["merge", "--dir", ".", "--output", "merged.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 3 rows from 2 files"));

    let merged = std::fs::read_to_string(dir.path().join("merged.csv")).unwrap();
    let lines: Vec<&str> = merged.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], "q1,Addition,Addition,1.000,alice");
    assert_eq!(lines[3], "q1,Counting,Addition,0.120,bob");
}

#[test]
fn merge_refuses_to_overwrite_a_ledger() {
    let dir = TempDir::new().unwrap();
    let bob = format!("{LEDGER_HEADER}q2,Fractions,Fractions,1.000,bob\n");
    std::fs::write(
        dir.path().join("annotations_alice.csv"),
        format!("{LEDGER_HEADER}q1,Addition,Addition,1.000,alice\n"),
    )
    .unwrap();
    std::fs::write(dir.path().join("annotations_bob.csv"), &bob).unwrap();

    prereq(dir.path())
        .args(["merge", "--dir", ".", "--output", "annotations_bob.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to overwrite"));

    let after = std::fs::read_to_string(dir.path().join("annotations_bob.csv")).unwrap();
    assert_eq!(after, bob);
}

#[test]
fn merge_without_ledgers_fails() {
    let dir = TempDir::new().unwrap();

    prereq(dir.path())
        .args(["merge", "--dir", ".", "--output", "merged.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no ledger files"));
}

#[test]
fn generate_with_mock_provider() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("questions.jsonl"),
        "{\"question\": \"What is 2 + 2?\", \"answer\": \"4\"}\n\
         {\"question\": \"What is 3 + 3?\", \"answer\": \"6\"}\n\
         {\"question\": \"What is 4 + 4?\", \"answer\": \"8\"}\n",
    )
    .unwrap();

    prereq(dir.path())
        .args([
            "generate",
            "--input",
            "questions.jsonl",
            "--output",
            "out.csv",
            "--provider",
            "mock",
            "--limit",
            "2",
            "--delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved results to out.csv"));

    let out = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "question,prerequisites");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(",None"));
}

#[test]
fn generate_rejects_unknown_input_format() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("questions.txt"), "What is 2 + 2?\n").unwrap();

    prereq(dir.path())
        .args(["generate", "--input", "questions.txt", "--provider", "mock"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected .jsonl or .csv"));
}

#[test]
fn generate_with_unconfigured_provider_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("questions.jsonl"),
        "{\"question\": \"What is 2 + 2?\"}\n",
    )
    .unwrap();

    prereq(dir.path())
        .args(["generate", "--input", "questions.jsonl", "--provider", "anthropic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider 'anthropic' is not configured"));
}

#[test]
fn list_models_from_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("prereq.toml"),
        "[providers.gemini]\ntype = \"gemini\"\napi_key = \"test-key\"\n",
    )
    .unwrap();

    prereq(dir.path())
        .arg("list-models")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider: gemini"))
        .stdout(predicate::str::contains("gemini-2.0-flash"));
}

#[test]
fn list_models_without_config() {
    let dir = TempDir::new().unwrap();

    prereq(dir.path())
        .arg("list-models")
        .assert()
        .success()
        .stdout(predicate::str::contains("No providers configured"));
}
