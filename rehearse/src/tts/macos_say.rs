// macOS say command TTS backend

use super::{TtsBackend, TtsOptions, Voice};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// 16-bit little-endian PCM, readable by the player without conversion
const WAV_FORMAT: &str = "LEI16@22050";

/// macOS TTS backend using the `say` command
pub struct MacOsSayBackend;

impl MacOsSayBackend {
    pub fn new() -> Self {
        Self
    }

    /// Parse voice list output from `say -v ?`
    fn parse_voice_list(output: &str) -> Vec<Voice> {
        output
            .lines()
            .filter_map(|line| {
                // "Name    language  # sample sentence"; names may contain spaces
                let (head, _) = line.split_once('#').unwrap_or((line, ""));
                let mut words: Vec<&str> = head.split_whitespace().collect();
                let has_language =
                    words.len() > 1 && words.last().is_some_and(|w| w.contains('_'));
                let language = if has_language {
                    words.pop().map(|l| l.replace('_', "-"))
                } else {
                    None
                };
                if words.is_empty() {
                    return None;
                }
                let name = words.join(" ");
                Some(Voice {
                    id: name.clone(),
                    name,
                    language,
                })
            })
            .collect()
    }
}

impl Default for MacOsSayBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsBackend for MacOsSayBackend {
    async fn synthesize(&self, text: &str, output_path: &Path, options: &TtsOptions) -> Result<()> {
        let mut cmd = Command::new("say");
        if let Some(voice) = &options.voice {
            cmd.arg("-v").arg(voice);
        }

        // Text goes through stdin, so lines starting with a dash are never read as flags
        let mut child = cmd
            .arg("-o")
            .arg(output_path)
            .arg("--file-format=WAVE")
            .arg(format!("--data-format={}", WAV_FORMAT))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn say. It is only available on macOS")?;

        let mut stdin = child.stdin.take().context("say stdin unavailable")?;
        stdin
            .write_all(text.as_bytes())
            .await
            .context("Failed to write to say stdin")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for say")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("say failed ({}): {}", output.status, stderr.trim());
        }

        Ok(())
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = std::process::Command::new("say")
            .args(["-v", "?"])
            .output()
            .context("Failed to run say -v ?")?;

        if !output.status.success() {
            anyhow::bail!("say -v ? failed");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_voice_list(&stdout))
    }

    fn name(&self) -> &str {
        "macos-say"
    }

    fn file_extension(&self) -> &str {
        "wav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_list() {
        let output = r#"Amélie              fr_CA    # Bonjour, je m’appelle Amélie. Je suis une voix canadienne.
Thomas              fr_FR    # Bonjour, je m’appelle Thomas. Je suis une voix française.
Bad News            en_US    # The light you see at the end of the tunnel is the headlamp of a fast approaching train.
"#;
        let voices = MacOsSayBackend::parse_voice_list(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "Amélie");
        assert_eq!(voices[0].language.as_deref(), Some("fr-CA"));
        assert_eq!(voices[1].id, "Thomas");
        assert_eq!(voices[2].name, "Bad News");
        assert_eq!(voices[2].language.as_deref(), Some("en-US"));
    }
}
