use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `docex` isolated from the user's config, environment and working directory.
fn docex(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docex").unwrap();
    cmd.current_dir(home);
    cmd.env("HOME", home);
    cmd.env("XDG_CONFIG_HOME", home.join(".config"));
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("GEMINI_API_KEY");
    cmd.env_remove("DOCEX_AI_PROVIDER");
    cmd.env_remove("OLLAMA_HOST");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("extract")
                .and(predicate::str::contains("batch"))
                .and(predicate::str::contains("models"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn config_path_is_under_config_dir() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docex").and(predicate::str::contains("config.json")));
}

#[test]
fn config_init_then_get_reads_defaults() {
    let home = TempDir::new().unwrap();
    docex(home.path()).args(["config", "init"]).assert().success();
    assert!(home.path().join(".config/docex/config.json").exists());

    docex(home.path())
        .args(["config", "get", "ollama.model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("llama3.2-vision"));

    docex(home.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_set_persists_provider() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["config", "set", "ai_provider", "gemini"])
        .assert()
        .success();
    docex(home.path())
        .args(["config", "get", "ai_provider"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gemini"));
}

#[test]
fn extract_missing_file_fails() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["extract", "nope.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn extract_with_openai_is_not_implemented() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("doc.pdf"), b"%PDF-1.4\n%%EOF\n").unwrap();
    docex(home.path())
        .args(["extract", "doc.pdf", "--provider", "openai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not yet implemented"));
}

#[test]
fn extract_with_gemini_requires_api_key() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("receipt.png"), b"\x89PNG\r\n\x1a\n").unwrap();
    let output = docex(home.path())
        .args(["extract", "receipt.png", "--provider", "gemini"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("configuration error").count(), 1, "{}", stderr);
}

#[test]
fn list_on_empty_store() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents"));
}

#[test]
fn show_unknown_document_fails() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["show", "6f1c1b5e-2c3a-4e8e-9d5b-0f4f6c1e9a77"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn models_status_reports_missing_files() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["models", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing").and(predicate::str::contains("det.onnx")));
}

#[test]
fn batch_without_matches_fails() {
    let home = TempDir::new().unwrap();
    docex(home.path())
        .args(["batch", "*.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}
