// Scene loading, prepared manifests and script parsing

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RehearseConfig;

const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// Speaker cue at the start of a script line: `NAME. text` or `NAME (aside). text`
static CUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-ZÀ-ÖØ-Þ\-\s]+(?:\([^)]+\))?)\.\s*(.*)").unwrap());

static PARENTHETICAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(([^)]*)\)").unwrap());

/// One line as written in a scene file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    #[serde(default = "unknown_speaker")]
    pub speaker: String,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

fn unknown_speaker() -> String {
    UNKNOWN_SPEAKER.to_string()
}

/// One utterance of a loaded scene
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub index: usize,
    pub speaker: String,
    pub text: String,
    /// Stage direction, shown but never spoken
    pub action: Option<String>,
    /// Pre-generated narration for this line
    pub audio: Option<PathBuf>,
}

/// A named, ordered, immutable list of lines
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    name: String,
    lines: Vec<Line>,
    speakers: Vec<String>,
}

impl Scene {
    /// Build a scene from records in authored order
    pub fn new(name: impl Into<String>, records: Vec<LineRecord>) -> Self {
        let lines = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| Line {
                index,
                speaker: record.speaker,
                text: record.text,
                action: record.action.filter(|a| !a.trim().is_empty()),
                audio: None,
            })
            .collect();
        Self::from_lines(name.into(), lines)
    }

    fn from_lines(name: String, lines: Vec<Line>) -> Self {
        let speakers = lines
            .iter()
            .map(|line| line.speaker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            name,
            lines,
            speakers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Distinct speakers, sorted
    pub fn speakers(&self) -> &[String] {
        &self.speakers
    }

    pub fn has_speaker(&self, role: &str) -> bool {
        self.speakers.iter().any(|s| s == role)
    }

    /// Match a typed role name against the speaker set, ignoring case and padding
    pub fn find_role(&self, input: &str) -> Option<&str> {
        let wanted = input.trim();
        self.speakers
            .iter()
            .find(|s| s.as_str() == wanted)
            .or_else(|| {
                let upper = wanted.to_uppercase();
                self.speakers.iter().find(|s| s.to_uppercase() == upper)
            })
            .map(String::as_str)
    }

    /// Drop every audio reference (narrated lines become silent)
    pub fn without_audio(mut self) -> Self {
        for line in &mut self.lines {
            line.audio = None;
        }
        self
    }

    pub fn audio_count(&self) -> usize {
        self.lines.iter().filter(|l| l.audio.is_some()).count()
    }
}

/// Load the line records of a scene file. Any failure yields an empty list.
pub fn load_lines(path: &Path) -> Vec<LineRecord> {
    match read_lines(path) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Could not load scene {}: {:#}", path.display(), e);
            Vec::new()
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<LineRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene file: {}", path.display()))?;
    let records: Vec<LineRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scene file: {}", path.display()))?;
    Ok(records)
}

/// Write line records as a scene file
pub fn save_lines(path: &Path, records: &[LineRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(records).context("Failed to serialize scene")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write scene file: {}", path.display()))?;
    Ok(())
}

/// A prepared line: the scene line plus its narration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestLine {
    pub id: usize,
    pub speaker: String,
    pub text: String,
    #[serde(default)]
    pub action: Option<String>,
    /// Path relative to the manifest directory
    #[serde(default)]
    pub audio: Option<String>,
}

/// Output of `prepare`: a scene with its audio references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub scene: String,
    pub generated_at: DateTime<Utc>,
    pub roles: Vec<String>,
    pub dialogue: Vec<ManifestLine>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    /// Turn the manifest into a scene, resolving audio paths against `base_dir`
    pub fn into_scene(self, base_dir: &Path) -> Scene {
        let mut dialogue = self.dialogue;
        dialogue.sort_by_key(|line| line.id);
        if !ids_are_dense(&dialogue) {
            log::warn!(
                "Manifest for {} has line ids that are not 0..{}, lines renumbered in id order",
                self.scene,
                dialogue.len()
            );
        }

        let lines = dialogue
            .into_iter()
            .enumerate()
            .map(|(index, line)| Line {
                index,
                speaker: line.speaker,
                text: line.text,
                action: line.action.filter(|a| !a.trim().is_empty()),
                audio: line.audio.map(|rel| base_dir.join(rel)),
            })
            .collect();
        Scene::from_lines(self.scene, lines)
    }
}

/// True when sorted manifest ids run 0, 1, 2... with no gap or repeat
fn ids_are_dense(sorted: &[ManifestLine]) -> bool {
    sorted.iter().enumerate().all(|(index, line)| line.id == index)
}

/// Where a scene was loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum SceneSource {
    Manifest(PathBuf),
    Raw(PathBuf),
}

/// Find a scene by name or path, preferring its prepared manifest.
///
/// A path to an existing `.json` file is loaded as a manifest when it parses as
/// one, and as a raw scene file otherwise. A bare name is looked up first in
/// `prepared_dir`, then in `scenes_dir`.
pub fn resolve_scene(name_or_path: &str, config: &RehearseConfig) -> (Scene, SceneSource) {
    let as_path = PathBuf::from(name_or_path);
    if as_path.is_file() {
        let name = scene_name(&as_path);
        if let Ok(manifest) = Manifest::load(&as_path) {
            let base = as_path.parent().unwrap_or(Path::new(".")).to_path_buf();
            return (manifest.into_scene(&base), SceneSource::Manifest(as_path));
        }
        let records = load_lines(&as_path);
        return (Scene::new(name, records), SceneSource::Raw(as_path));
    }

    let manifest_path = config.prepared_path().join(format!("{}.json", name_or_path));
    if manifest_path.is_file() {
        match Manifest::load(&manifest_path) {
            Ok(manifest) => {
                return (
                    manifest.into_scene(&config.prepared_path()),
                    SceneSource::Manifest(manifest_path),
                );
            }
            Err(e) => log::warn!("Ignoring prepared scene: {:#}", e),
        }
    }

    let raw_path = config.scenes_path().join(format!("{}.json", name_or_path));
    let records = load_lines(&raw_path);
    (
        Scene::new(name_or_path.to_string(), records),
        SceneSource::Raw(raw_path),
    )
}

/// Scene name from a file path (its stem)
pub fn scene_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Scene files in a directory, sorted by name
pub fn list_scenes(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read scenes directory: {}", dir.display()))?;

    let mut scenes = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if path.is_file() && is_json {
            scenes.push(path);
        }
    }
    scenes.sort();
    Ok(scenes)
}

/// Parse hand-edited script text into line records.
///
/// A speaker cue (`NAME. text`) starts a new line, following non-blank lines
/// continue it. Text before the first cue is dropped. A parenthetical in the cue
/// becomes the line's action.
pub fn parse_script(text: &str) -> Vec<LineRecord> {
    let mut records = Vec::new();
    let mut current: Option<(String, Option<String>, Vec<String>)> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = CUE_RE.captures(line) {
            if let Some((speaker, action, parts)) = current.take() {
                records.push(finish_record(speaker, action, parts));
            }

            let cue = &caps[1];
            let action = PARENTHETICAL_RE
                .captures(cue)
                .map(|c| c[1].trim().to_string())
                .filter(|a| !a.is_empty());
            let speaker = PARENTHETICAL_RE.replace_all(cue, "").trim().to_string();
            current = Some((speaker, action, vec![caps[2].to_string()]));
        } else if let Some((_, _, parts)) = current.as_mut() {
            parts.push(line.to_string());
        }
    }

    if let Some((speaker, action, parts)) = current {
        records.push(finish_record(speaker, action, parts));
    }

    records
}

fn finish_record(speaker: String, action: Option<String>, parts: Vec<String>) -> LineRecord {
    LineRecord {
        speaker,
        text: parts.join(" ").trim().to_string(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(speaker: &str, text: &str) -> LineRecord {
        LineRecord {
            speaker: speaker.to_string(),
            text: text.to_string(),
            action: None,
        }
    }

    #[test]
    fn test_scene_assigns_dense_indices() {
        let scene = Scene::new(
            "test",
            vec![record("A", "one"), record("B", "two"), record("A", "three")],
        );
        let indices: Vec<usize> = scene.lines().iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(scene.lines()[2].text, "three");
    }

    #[test]
    fn test_speakers_are_distinct_and_sorted() {
        let scene = Scene::new(
            "test",
            vec![record("MARIE", "a"), record("JEAN", "b"), record("MARIE", "c")],
        );
        assert_eq!(scene.speakers(), &["JEAN".to_string(), "MARIE".to_string()]);
        assert!(scene.has_speaker("JEAN"));
        assert!(!scene.has_speaker("jean"));
    }

    #[test]
    fn test_find_role_normalizes_input() {
        let scene = Scene::new("test", vec![record("MARIE", "a")]);
        assert_eq!(scene.find_role("  marie "), Some("MARIE"));
        assert_eq!(scene.find_role("MARIE"), Some("MARIE"));
        assert_eq!(scene.find_role("JEAN"), None);
    }

    #[test]
    fn test_empty_action_is_absent() {
        let scene = Scene::new(
            "test",
            vec![LineRecord {
                speaker: "A".to_string(),
                text: "hi".to_string(),
                action: Some("  ".to_string()),
            }],
        );
        assert_eq!(scene.lines()[0].action, None);
    }

    #[test]
    fn test_load_lines_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scene.json");
        fs::write(
            &path,
            r#"[{"speaker": "A", "text": "hello"}, {"text": "orphan"}, {"speaker": "B", "action": "enters"}]"#,
        )
        .unwrap();

        let records = load_lines(&path);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].speaker, "UNKNOWN");
        assert_eq!(records[2].text, "");
        assert_eq!(records[2].action.as_deref(), Some("enters"));
    }

    #[test]
    fn test_load_lines_failure_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(load_lines(&temp.path().join("missing.json")).is_empty());

        let bad = temp.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(load_lines(&bad).is_empty());
    }

    #[test]
    fn test_manifest_resolves_audio_paths() {
        let manifest = Manifest {
            scene: "acte1".to_string(),
            generated_at: Utc::now(),
            roles: vec!["A".to_string(), "B".to_string()],
            dialogue: vec![
                ManifestLine {
                    id: 1,
                    speaker: "B".to_string(),
                    text: "second".to_string(),
                    action: None,
                    audio: None,
                },
                ManifestLine {
                    id: 0,
                    speaker: "A".to_string(),
                    text: "first".to_string(),
                    action: Some(String::new()),
                    audio: Some("audio/acte1_000.mp3".to_string()),
                },
            ],
        };

        let scene = manifest.into_scene(Path::new("/prepared"));
        assert_eq!(scene.name(), "acte1");
        assert_eq!(scene.lines()[0].text, "first");
        assert_eq!(
            scene.lines()[0].audio,
            Some(PathBuf::from("/prepared/audio/acte1_000.mp3"))
        );
        assert_eq!(scene.lines()[0].action, None);
        assert_eq!(scene.lines()[1].audio, None);
        assert_eq!(scene.audio_count(), 1);
        assert_eq!(scene.without_audio().audio_count(), 0);
    }

    #[test]
    fn test_manifest_id_gaps_are_detected() {
        let line = |id: usize| ManifestLine {
            id,
            speaker: "A".to_string(),
            text: format!("line {}", id),
            action: None,
            audio: None,
        };
        assert!(ids_are_dense(&[line(0), line(1), line(2)]));
        assert!(ids_are_dense(&[]));
        assert!(!ids_are_dense(&[line(0), line(2)]));
        assert!(!ids_are_dense(&[line(0), line(0), line(1)]));
        assert!(!ids_are_dense(&[line(1), line(2)]));

        let manifest = Manifest {
            scene: "trou".to_string(),
            generated_at: Utc::now(),
            roles: vec!["A".to_string()],
            dialogue: vec![line(5), line(2)],
        };
        let scene = manifest.into_scene(Path::new("/prepared"));
        let texts: Vec<(usize, &str)> = scene
            .lines()
            .iter()
            .map(|l| (l.index, l.text.as_str()))
            .collect();
        assert_eq!(texts, vec![(0, "line 2"), (1, "line 5")]);
    }

    #[test]
    fn test_list_scenes_sorted_json_only() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.json"), "[]").unwrap();
        fs::write(temp.path().join("a.json"), "[]").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let scenes = list_scenes(temp.path()).unwrap();
        let names: Vec<String> = scenes.iter().map(|p| scene_name(p)).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_script() {
        let text = "Acte I\n\nJEAN. Bonjour Marie.\nComment vas-tu ?\n\nMARIE (souriant). Très bien.\nJEAN-PIERRE. Et moi ?\n";
        let records = parse_script(text);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0], record("JEAN", "Bonjour Marie. Comment vas-tu ?"));
        assert_eq!(records[1].speaker, "MARIE");
        assert_eq!(records[1].text, "Très bien.");
        assert_eq!(records[1].action.as_deref(), Some("souriant"));
        assert_eq!(records[2].speaker, "JEAN-PIERRE");
    }

    #[test]
    fn test_parse_script_accented_speaker_and_empty_text() {
        let records = parse_script("HÉLÈNE.\nÉMILE. Oui.");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record("HÉLÈNE", ""));
        assert_eq!(records[1], record("ÉMILE", "Oui."));
    }
}
