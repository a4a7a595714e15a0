//! CLI integration tests: run the actual kismet binary.
//! Marked `#[ignore]` to skip in normal `cargo test`.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Project dir whose `.kismet/config.toml` points storage at a temp location
/// and uses a keyless text provider.
fn project() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kismet-cli-test-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(dir.join(".kismet")).unwrap();
    let config = format!(
        "[storage]\npath = \"{db}\"\n\n[files]\nroot = \"{files}\"\n\n[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n",
        db = dir.join("kismet.db").display(),
        files = dir.join("files").display(),
    );
    std::fs::write(dir.join(".kismet/config.toml"), config).unwrap();
    dir
}

fn kismet(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kismet"));
    cmd.current_dir(dir);
    cmd
}

#[test]
#[ignore]
fn test_cli_saved_json_empty() {
    let dir = project();
    let output = kismet(&dir)
        .args(["saved", "story", "--json"])
        .output()
        .expect("failed to execute");
    assert!(
        output.status.success(),
        "kismet saved failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let items: Vec<serde_json::Value> =
        serde_json::from_str(stdout.trim()).expect("invalid JSON output");
    assert!(items.is_empty());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[ignore]
fn test_cli_blank_prompt_is_rejected() {
    let dir = project();
    let output = kismet(&dir)
        .args(["story", "   "])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Prompt cannot be empty"));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[ignore]
fn test_cli_delete_missing_fails() {
    let dir = project();
    let output = kismet(&dir)
        .args(["delete", "recipe", "Nothing Here"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[ignore]
fn test_cli_config_shows_project_settings() {
    let dir = project();
    let output = kismet(&dir).arg("config").output().expect("failed to execute");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("provider = \"ollama\""));
    assert!(stdout.contains("kismet.db"));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[ignore]
fn test_cli_rejects_bad_color() {
    let dir = project();
    let output = kismet(&dir)
        .args(["image", "--color", "#12"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid color"));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
#[ignore]
fn test_cli_export_missing_story_fails() {
    let dir = project();
    let output = kismet(&dir)
        .args(["export", "42"])
        .output()
        .expect("failed to execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no saved story with id 42"));
    std::fs::remove_dir_all(&dir).ok();
}
