use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn rehearse_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("rehearse").into();
    cmd.env("HOME", temp_dir.path())
        .env_remove("RUST_LOG")
        .current_dir(temp_dir.path());
    cmd
}

fn write_config(temp_dir: &TempDir, content: &str) {
    let config_dir = temp_dir.path().join(".config").join("cli-programs");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("rehearse.toml"), content).unwrap();
}

fn write_scene(dir: &Path, name: &str, content: &str) {
    let scenes = dir.join("scenes");
    fs::create_dir_all(&scenes).unwrap();
    fs::write(scenes.join(format!("{}.json", name)), content).unwrap();
}

const DUO: &str = r#"[
  {"speaker": "MARIE", "text": "Qui est là ?"},
  {"speaker": "JEAN", "text": "C'est moi.", "action": "entrant"}
]"#;

// ============================================================================
// CLI Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rehearse a theatre scene"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("prepare"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_displays() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rehearse"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_show_defaults() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend = \"edge-tts\""))
        .stdout(predicate::str::contains("silent_delay_ms = 1500"))
        .stdout(predicate::str::contains("max_alias_depth = 8"));
}

#[test]
fn test_config_set_persists() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["config", "set", "silent_delay_ms", "20"])
        .assert()
        .success();

    let saved = fs::read_to_string(
        temp_dir
            .path()
            .join(".config")
            .join("cli-programs")
            .join("rehearse.toml"),
    )
    .unwrap();
    assert!(saved.contains("silent_delay_ms = 20"));

    rehearse_cmd(&temp_dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("silent_delay_ms = 20"));
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["config", "set", "tempo", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_config_set_rejects_invalid_number() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["config", "set", "failure_grace_ms", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value"));
}

#[test]
fn test_config_set_rejects_unknown_backend() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["config", "set", "backend", "festival"])
        .assert()
        .failure();
}

// ============================================================================
// Scene Tests
// ============================================================================

#[test]
fn test_parse_writes_scene_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("balcon.txt"),
        "Scène 2\n\nJEAN (entrant). Bonjour\nMarie.\n\nMARIE. Bonsoir.\n",
    )
    .unwrap();

    rehearse_cmd(&temp_dir)
        .args(["parse", "balcon.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 lines"))
        .stdout(predicate::str::contains("JEAN, MARIE"));

    let written = fs::read_to_string(temp_dir.path().join("scenes").join("balcon.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(records[0]["speaker"], "JEAN");
    assert_eq!(records[0]["text"], "Bonjour Marie.");
    assert_eq!(records[0]["action"], "entrant");
    assert_eq!(records[1]["speaker"], "MARIE");
}

#[test]
fn test_parse_without_cues_fails() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("notes.txt"), "nothing to see here\n").unwrap();

    rehearse_cmd(&temp_dir)
        .args(["parse", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No speaker cues"));
}

#[test]
fn test_scenes_lists_speakers() {
    let temp_dir = TempDir::new().unwrap();
    write_scene(temp_dir.path(), "duo", DUO);

    rehearse_cmd(&temp_dir)
        .arg("scenes")
        .assert()
        .success()
        .stdout(predicate::str::contains("duo"))
        .stdout(predicate::str::contains("2 lines: JEAN, MARIE"));
}

#[test]
fn test_import_missing_pdf_fails() {
    let temp_dir = TempDir::new().unwrap();
    rehearse_cmd(&temp_dir)
        .args(["import", "absent.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

// ============================================================================
// Casting Tests
// ============================================================================

#[test]
fn test_voices_resolves_casting() {
    let temp_dir = TempDir::new().unwrap();
    write_scene(temp_dir.path(), "duo", DUO);
    fs::write(
        temp_dir.path().join("casting.json"),
        r#"{"voices": {"homme": "fr-FR-HenriNeural"}, "roles": {"JEAN": "homme"}}"#,
    )
    .unwrap();

    rehearse_cmd(&temp_dir)
        .args(["voices", "duo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fr-FR-HenriNeural"))
        .stdout(predicate::str::contains("fr-FR-DeniseNeural"));
}

#[test]
fn test_voices_reports_ambiguous_roles() {
    let temp_dir = TempDir::new().unwrap();
    write_scene(
        temp_dir.path(),
        "trio",
        r#"[{"speaker": "JEAN-PIERRE", "text": "Oui."}]"#,
    );
    fs::write(
        temp_dir.path().join("casting.json"),
        r#"{"roles": {"JEAN": "fr-FR-HenriNeural", "PIERRE": "fr-FR-RemyMultilingualNeural"}}"#,
    )
    .unwrap();

    rehearse_cmd(&temp_dir)
        .args(["voices", "trio"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ERROR"))
        .stderr(predicate::str::contains("casting problems"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_run_unknown_role_fails() {
    let temp_dir = TempDir::new().unwrap();
    write_scene(temp_dir.path(), "duo", DUO);

    rehearse_cmd(&temp_dir)
        .args(["run", "duo", "--role", "ROMEO"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not appear"))
        .stderr(predicate::str::contains("JEAN, MARIE"));
}

#[test]
fn test_run_missing_scene_fails() {
    let temp_dir = TempDir::new().unwrap();

    rehearse_cmd(&temp_dir)
        .args(["run", "absent", "--role", "JEAN"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty or could not be read"));
}

#[test]
fn test_run_stops_at_user_line_when_input_closes() {
    let temp_dir = TempDir::new().unwrap();
    write_config(&temp_dir, "silent_delay_ms = 10\n");
    write_scene(temp_dir.path(), "duo", DUO);

    rehearse_cmd(&temp_dir)
        .args(["run", "duo", "--role", "jean"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rehearsing duo as JEAN"))
        .stdout(predicate::str::contains("YOUR LINE"))
        .stdout(predicate::str::contains("[entrant]"))
        .stdout(predicate::str::contains("C'est moi.").not())
        .stdout(predicate::str::contains("Input closed"));
}

#[test]
fn test_run_to_end_of_scene() {
    let temp_dir = TempDir::new().unwrap();
    write_config(&temp_dir, "silent_delay_ms = 10\n");
    write_scene(
        temp_dir.path(),
        "duo",
        r#"[
  {"speaker": "JEAN", "text": "Bonjour."},
  {"speaker": "MARIE", "text": "Bonsoir."}
]"#,
    );

    rehearse_cmd(&temp_dir)
        .args(["run", "duo", "--role", "JEAN", "--mute"])
        .write_stdin("\n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bonjour."))
        .stdout(predicate::str::contains("Scene complete."));
}
