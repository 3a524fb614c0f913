// TTS backend trait and types

pub mod edge;
pub mod macos_say;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Backend names accepted by `create_backend`
pub const BACKENDS: &[&str] = &["edge-tts", "macos-say"];

static STAGE_DIRECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]+\)").unwrap());

/// Represents an available voice
#[derive(Debug, Clone)]
pub struct Voice {
    /// Voice identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Language/locale (e.g., "fr-FR")
    pub language: Option<String>,
}

/// Options for TTS synthesis
#[derive(Debug, Clone, Default)]
pub struct TtsOptions {
    /// Voice to use
    pub voice: Option<String>,
}

/// TTS backend trait - all TTS engines implement this
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize text to audio file
    async fn synthesize(&self, text: &str, output_path: &Path, options: &TtsOptions) -> Result<()>;

    /// List available voices
    fn list_voices(&self) -> Result<Vec<Voice>>;

    /// Backend name
    fn name(&self) -> &str;

    /// Extension of the files this backend writes
    fn file_extension(&self) -> &str;
}

/// Create a TTS backend by name
pub fn create_backend(name: &str) -> Result<Box<dyn TtsBackend>> {
    match name {
        "edge-tts" => Ok(Box::new(edge::EdgeTtsBackend::new())),
        "macos-say" => Ok(Box::new(macos_say::MacOsSayBackend::new())),
        _ => anyhow::bail!(
            "Unknown TTS backend: {}. Available: {}",
            name,
            BACKENDS.join(", ")
        ),
    }
}

/// Text to speak for a line: stage directions in parentheses are dropped.
/// Returns `None` when nothing is left to say.
pub fn clean_for_speech(text: &str) -> Option<String> {
    let cleaned = STAGE_DIRECTION_RE.replace_all(text, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
