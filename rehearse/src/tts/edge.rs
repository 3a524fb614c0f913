// edge-tts command TTS backend (Microsoft Edge online voices)

use super::{TtsBackend, TtsOptions, Voice};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

const EDGE_TTS_BIN: &str = "edge-tts";

/// Backend driving the `edge-tts` command line tool
pub struct EdgeTtsBackend;

impl EdgeTtsBackend {
    pub fn new() -> Self {
        Self
    }

    /// Parse `edge-tts --list-voices`.
    ///
    /// Recent versions print a table whose first column is the voice name,
    /// older ones print `Name: <voice>` blocks.
    fn parse_voice_list(output: &str) -> Vec<Voice> {
        output
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                let name = match line.strip_prefix("Name:") {
                    Some(rest) => rest.trim(),
                    None => line.split_whitespace().next()?,
                };
                if !looks_like_voice(name) {
                    return None;
                }
                Some(Voice {
                    id: name.to_string(),
                    name: name.to_string(),
                    language: voice_language(name),
                })
            })
            .collect()
    }
}

impl Default for EdgeTtsBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Voice names look like `fr-FR-DeniseNeural`
fn looks_like_voice(name: &str) -> bool {
    let parts: Vec<&str> = name.split('-').collect();
    parts.len() >= 3
        && parts[0].len() >= 2
        && parts[0].chars().all(|c| c.is_ascii_lowercase())
        && parts.last().is_some_and(|p| p.ends_with("Neural"))
}

fn voice_language(name: &str) -> Option<String> {
    let mut parts = name.splitn(3, '-');
    match (parts.next(), parts.next()) {
        (Some(lang), Some(region)) => Some(format!("{}-{}", lang, region)),
        _ => None,
    }
}

#[async_trait]
impl TtsBackend for EdgeTtsBackend {
    async fn synthesize(&self, text: &str, output_path: &Path, options: &TtsOptions) -> Result<()> {
        let mut cmd = Command::new(EDGE_TTS_BIN);

        if let Some(voice) = &options.voice {
            cmd.arg("--voice").arg(voice);
        }

        // `--text=` keeps lines starting with a dash from being read as options
        let output = cmd
            .arg(format!("--text={}", text))
            .arg("--write-media")
            .arg(output_path)
            .output()
            .await
            .context("Failed to run edge-tts. Is it installed (pip install edge-tts)?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("edge-tts failed: {}", stderr.trim());
        }

        Ok(())
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = std::process::Command::new(EDGE_TTS_BIN)
            .arg("--list-voices")
            .output()
            .context("Failed to run edge-tts --list-voices")?;

        if !output.status.success() {
            anyhow::bail!("edge-tts --list-voices failed");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_voice_list(&stdout))
    }

    fn name(&self) -> &str {
        "edge-tts"
    }

    fn file_extension(&self) -> &str {
        "mp3"
    }
}
