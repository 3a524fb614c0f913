// rehearse configuration management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKEND: &str = "edge-tts";
const DEFAULT_SILENT_DELAY_MS: u64 = 1500;
const DEFAULT_FAILURE_GRACE_MS: u64 = 2000;
const DEFAULT_MAX_ALIAS_DEPTH: usize = 8;

/// Keys accepted by `rehearse config set`
pub const CONFIG_KEYS: &[&str] = &[
    "backend",
    "scenes_dir",
    "prepared_dir",
    "casting_file",
    "silent_delay_ms",
    "failure_grace_ms",
    "max_alias_depth",
    "context_before",
    "context_after",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RehearseConfig {
    /// TTS backend used by `prepare`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory holding scene JSON files
    #[serde(default = "default_scenes_dir")]
    pub scenes_dir: String,

    /// Directory receiving prepared manifests and audio
    #[serde(default = "default_prepared_dir")]
    pub prepared_dir: String,

    /// Casting file mapping roles to voices
    #[serde(default = "default_casting_file")]
    pub casting_file: String,

    /// Pause before moving past a narrated line that has no audio
    #[serde(default = "default_silent_delay_ms")]
    pub silent_delay_ms: u64,

    /// Pause before moving past a line whose audio failed to play
    #[serde(default = "default_failure_grace_ms")]
    pub failure_grace_ms: u64,

    /// Maximum number of voice alias hops
    #[serde(default = "default_max_alias_depth")]
    pub max_alias_depth: usize,

    /// Lines shown before the active one
    #[serde(default = "default_context_before")]
    pub context_before: usize,

    /// Lines shown after the active one
    #[serde(default = "default_context_after")]
    pub context_after: usize,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_scenes_dir() -> String {
    "scenes".to_string()
}

fn default_prepared_dir() -> String {
    "prepared".to_string()
}

fn default_casting_file() -> String {
    "casting.json".to_string()
}

fn default_silent_delay_ms() -> u64 {
    DEFAULT_SILENT_DELAY_MS
}

fn default_failure_grace_ms() -> u64 {
    DEFAULT_FAILURE_GRACE_MS
}

fn default_max_alias_depth() -> usize {
    DEFAULT_MAX_ALIAS_DEPTH
}

fn default_context_before() -> usize {
    3
}

fn default_context_after() -> usize {
    2
}

impl Default for RehearseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            scenes_dir: default_scenes_dir(),
            prepared_dir: default_prepared_dir(),
            casting_file: default_casting_file(),
            silent_delay_ms: default_silent_delay_ms(),
            failure_grace_ms: default_failure_grace_ms(),
            max_alias_depth: default_max_alias_depth(),
            context_before: default_context_before(),
            context_after: default_context_after(),
        }
    }
}

impl RehearseConfig {
    /// Get the config file path: ~/.config/cli-programs/rehearse.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("rehearse.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: RehearseConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Set one value by key, validating numbers
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "backend" => self.backend = value.to_string(),
            "scenes_dir" => self.scenes_dir = value.to_string(),
            "prepared_dir" => self.prepared_dir = value.to_string(),
            "casting_file" => self.casting_file = value.to_string(),
            "silent_delay_ms" => self.silent_delay_ms = parse_number(key, value)?,
            "failure_grace_ms" => self.failure_grace_ms = parse_number(key, value)?,
            "max_alias_depth" => {
                let depth = parse_number(key, value)?;
                if depth == 0 {
                    bail!("max_alias_depth must be at least 1");
                }
                self.max_alias_depth = depth;
            }
            "context_before" => self.context_before = parse_number(key, value)?,
            "context_after" => self.context_after = parse_number(key, value)?,
            _ => bail!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    pub fn scenes_path(&self) -> PathBuf {
        PathBuf::from(&self.scenes_dir)
    }

    pub fn prepared_path(&self) -> PathBuf {
        PathBuf::from(&self.prepared_dir)
    }

    pub fn casting_path(&self) -> PathBuf {
        PathBuf::from(&self.casting_file)
    }

    pub fn silent_delay(&self) -> Duration {
        Duration::from_millis(self.silent_delay_ms)
    }

    pub fn failure_grace(&self) -> Duration {
        Duration::from_millis(self.failure_grace_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: {} (expected a number)", key, value))
}
