// Narration preparation: synthesize every line of a scene and write its manifest

use anyhow::{Context, Result, bail};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::casting::{self, Casting};
use crate::scene::{Manifest, ManifestLine, Scene};
use crate::tts::{self, TtsBackend, TtsOptions};

const AUDIO_DIR: &str = "audio";
const HASH_LEN: usize = 12;

static UNSAFE_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// Settings for one preparation run
pub struct PrepareOptions<'a> {
    pub prepared_dir: &'a Path,
    pub casting: &'a Casting,
    pub max_alias_depth: usize,
    /// Regenerate audio even when a matching file exists
    pub force: bool,
    pub show_progress: bool,
}

/// What a preparation run produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    pub lines: usize,
    pub synthesized: usize,
    pub reused: usize,
    pub silent: usize,
    pub failed: usize,
}

/// Scene name usable in file names
pub fn safe_name(name: &str) -> String {
    UNSAFE_CHARS_RE.replace_all(name, "_").to_string()
}

/// Short content hash so an unchanged line keeps its file across runs
fn audio_key(voice: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voice.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LEN].to_string()
}

/// Path of a line's narration, relative to the prepared directory
fn audio_file_name(scene: &str, index: usize, key: &str, extension: &str) -> String {
    format!(
        "{}/{}_{:03}_{}.{}",
        AUDIO_DIR,
        safe_name(scene),
        index,
        key,
        extension
    )
}

/// Manifest path for a scene
pub fn manifest_path(prepared_dir: &Path, scene: &str) -> PathBuf {
    prepared_dir.join(format!("{}.json", scene))
}

/// Synthesize into a `.part` sibling and move it into place only once it is
/// complete, so an interrupted or failed synthesis never looks reusable
async fn synthesize_to(
    backend: &dyn TtsBackend,
    text: &str,
    path: &Path,
    options: &TtsOptions,
) -> Result<()> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = path.with_extension(format!("part.{}", extension));

    let result = match backend.synthesize(text, &partial, options).await {
        Ok(()) => match tokio::fs::metadata(&partial).await {
            Ok(meta) if meta.len() > 0 => tokio::fs::rename(&partial, path)
                .await
                .with_context(|| format!("Failed to move audio into {}", path.display())),
            Ok(_) => Err(anyhow::anyhow!("{} produced an empty file", backend.name())),
            Err(e) => Err(anyhow::anyhow!("{} wrote no audio: {}", backend.name(), e)),
        },
        Err(e) => Err(e),
    };

    if result.is_err() {
        // May not exist
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

/// Synthesize the narration of `scene` and write its manifest
pub async fn prepare_scene(
    scene: &Scene,
    backend: &dyn TtsBackend,
    options: &PrepareOptions<'_>,
) -> Result<PrepareReport> {
    // Casting problems abort before any audio is generated
    let voices = match casting::check_casting(scene.speakers(), options.casting, options.max_alias_depth)
    {
        Ok(voices) => voices,
        Err(errors) => {
            for error in &errors {
                log::error!("{}", error);
            }
            bail!(
                "Casting has {} problem(s) for scene {}",
                errors.len(),
                scene.name()
            );
        }
    };

    let audio_dir = options.prepared_dir.join(AUDIO_DIR);
    tokio::fs::create_dir_all(&audio_dir)
        .await
        .with_context(|| format!("Failed to create directory: {}", audio_dir.display()))?;

    let pb = if options.show_progress {
        let pb = ProgressBar::new(scene.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30}] {pos}/{len} {msg}")
                .unwrap(),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut report = PrepareReport {
        lines: scene.len(),
        ..Default::default()
    };
    let mut dialogue = Vec::with_capacity(scene.len());

    for line in scene.lines() {
        pb.set_message(line.speaker.clone());

        let voice = voices
            .iter()
            .find(|(speaker, _)| speaker == &line.speaker)
            .map(|(_, voice)| voice.clone())
            .unwrap_or_else(|| options.casting.default_voice.clone());

        let audio = match tts::clean_for_speech(&line.text) {
            None => {
                report.silent += 1;
                None
            }
            Some(text) => {
                let key = audio_key(&voice, &text);
                let relative =
                    audio_file_name(scene.name(), line.index, &key, backend.file_extension());
                let path = options.prepared_dir.join(&relative);

                if path.exists() && !options.force {
                    report.reused += 1;
                    Some(relative)
                } else {
                    let tts_options = TtsOptions {
                        voice: Some(voice.clone()),
                    };
                    match synthesize_to(backend, &text, &path, &tts_options).await {
                        Ok(()) => {
                            report.synthesized += 1;
                            Some(relative)
                        }
                        Err(e) => {
                            // The line is narrated silently instead
                            pb.suspend(|| {
                                log::warn!("Audio error for line {} ({}): {:#}", line.index, line.speaker, e)
                            });
                            report.failed += 1;
                            None
                        }
                    }
                }
            }
        };

        dialogue.push(ManifestLine {
            id: line.index,
            speaker: line.speaker.clone(),
            text: line.text.clone(),
            action: line.action.clone(),
            audio,
        });
        pb.inc(1);
    }

    pb.finish_and_clear();

    let manifest = Manifest {
        scene: scene.name().to_string(),
        generated_at: Utc::now(),
        roles: scene.speakers().to_vec(),
        dialogue,
    };
    manifest.save(&manifest_path(options.prepared_dir, scene.name()))?;

    Ok(report)
}
