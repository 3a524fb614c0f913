// Casting: which voice narrates which role

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

const DEFAULT_VOICE: &str = "fr-FR-DeniseNeural";

/// Role and voice tables loaded from `casting.json`.
///
/// `roles` maps an uppercase role name (or a fragment of one) to either a voice
/// or an alias; `voices` maps aliases such as `"homme"` to voices or to other
/// aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Casting {
    #[serde(default = "default_voice")]
    pub default_voice: String,

    #[serde(default)]
    pub voices: BTreeMap<String, String>,

    #[serde(default)]
    pub roles: BTreeMap<String, String>,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

impl Default for Casting {
    fn default() -> Self {
        Self {
            default_voice: default_voice(),
            voices: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastingError {
    #[error("speaker {speaker} matches several roles: {}", .candidates.join(", "))]
    Ambiguous {
        speaker: String,
        candidates: Vec<String>,
    },

    #[error("voice alias chain for {speaker} is longer than {max_depth}: {}", .chain.join(" -> "))]
    AliasDepthExceeded {
        speaker: String,
        max_depth: usize,
        chain: Vec<String>,
    },
}

impl Casting {
    /// Load the casting file, falling back to the default casting when missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!(
                "Casting file {} not found, every role uses the default voice",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read casting file: {}", path.display()))?;
        let casting: Casting = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse casting file: {}", path.display()))?;
        Ok(casting)
    }

    /// Role table entry for a speaker: exact key first, then a unique key
    /// contained in the speaker name
    fn role_entry(&self, speaker: &str) -> Result<Option<&String>, CastingError> {
        let name = speaker.trim().to_uppercase();

        if let Some(value) = self.roles.get(&name) {
            return Ok(Some(value));
        }

        let matches: Vec<(&String, &String)> = self
            .roles
            .iter()
            .filter(|(key, _)| !key.is_empty() && name.contains(key.as_str()))
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [(_, value)] => Ok(Some(value)),
            _ => Err(CastingError::Ambiguous {
                speaker: speaker.to_string(),
                candidates: matches.iter().map(|(key, _)| key.to_string()).collect(),
            }),
        }
    }
}

/// Resolve the voice that narrates `speaker`
pub fn resolve_voice(
    speaker: &str,
    casting: &Casting,
    max_depth: usize,
) -> Result<String, CastingError> {
    let mut current = casting
        .role_entry(speaker)?
        .unwrap_or(&casting.default_voice)
        .clone();
    let mut chain = vec![current.clone()];

    while let Some(next) = casting.voices.get(&current) {
        if chain.len() > max_depth {
            return Err(CastingError::AliasDepthExceeded {
                speaker: speaker.to_string(),
                max_depth,
                chain,
            });
        }
        current = next.clone();
        chain.push(current.clone());
    }

    Ok(current)
}

/// Resolve every speaker, collecting all failures
pub fn check_casting(
    speakers: &[String],
    casting: &Casting,
    max_depth: usize,
) -> Result<Vec<(String, String)>, Vec<CastingError>> {
    let mut resolved = Vec::new();
    let mut errors = Vec::new();

    for speaker in speakers {
        match resolve_voice(speaker, casting, max_depth) {
            Ok(voice) => resolved.push((speaker.clone(), voice)),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn casting() -> Casting {
        serde_json::from_str(
            r#"{
                "default_voice": "femme",
                "voices": {
                    "femme": "fr-FR-DeniseNeural",
                    "homme": "fr-FR-HenriNeural",
                    "vieux": "homme"
                },
                "roles": {
                    "JEAN": "homme",
                    "LE ROI": "vieux",
                    "NARRATEUR": "fr-FR-RemyMultilingualNeural"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_role_through_alias() {
        assert_eq!(
            resolve_voice("JEAN", &casting(), 8).unwrap(),
            "fr-FR-HenriNeural"
        );
    }

    #[test]
    fn test_role_match_ignores_case() {
        assert_eq!(
            resolve_voice(" jean ", &casting(), 8).unwrap(),
            "fr-FR-HenriNeural"
        );
    }

    #[test]
    fn test_direct_voice_name() {
        assert_eq!(
            resolve_voice("NARRATEUR", &casting(), 8).unwrap(),
            "fr-FR-RemyMultilingualNeural"
        );
    }

    #[test]
    fn test_substring_match() {
        assert_eq!(
            resolve_voice("JEAN-PIERRE", &casting(), 8).unwrap(),
            "fr-FR-HenriNeural"
        );
    }

    #[test]
    fn test_nested_alias() {
        assert_eq!(
            resolve_voice("LE ROI", &casting(), 8).unwrap(),
            "fr-FR-HenriNeural"
        );
    }

    #[test]
    fn test_default_voice_alias() {
        assert_eq!(
            resolve_voice("MARIE", &casting(), 8).unwrap(),
            "fr-FR-DeniseNeural"
        );
    }

    #[test]
    fn test_default_casting() {
        assert_eq!(
            resolve_voice("ANYONE", &Casting::default(), 8).unwrap(),
            "fr-FR-DeniseNeural"
        );
    }

    #[test]
    fn test_ambiguous_substring_is_flagged() {
        let mut casting = casting();
        casting
            .roles
            .insert("PIERRE".to_string(), "homme".to_string());

        let err = resolve_voice("JEAN-PIERRE", &casting, 8).unwrap_err();
        assert_eq!(
            err,
            CastingError::Ambiguous {
                speaker: "JEAN-PIERRE".to_string(),
                candidates: vec!["JEAN".to_string(), "PIERRE".to_string()],
            }
        );
        // An exact key still wins over fragments
        assert_eq!(
            resolve_voice("PIERRE", &casting, 8).unwrap(),
            "fr-FR-HenriNeural"
        );
    }

    #[test]
    fn test_alias_cycle_fails() {
        let mut casting = Casting::default();
        casting.voices.insert("a".to_string(), "b".to_string());
        casting.voices.insert("b".to_string(), "a".to_string());
        casting.roles.insert("X".to_string(), "a".to_string());

        match resolve_voice("X", &casting, 4) {
            Err(CastingError::AliasDepthExceeded { max_depth, chain, .. }) => {
                assert_eq!(max_depth, 4);
                assert_eq!(chain.len(), 5);
            }
            other => panic!("expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_chain_within_depth() {
        let mut casting = Casting::default();
        casting.voices.insert("a".to_string(), "b".to_string());
        casting.voices.insert("b".to_string(), "voice".to_string());
        casting.roles.insert("X".to_string(), "a".to_string());

        assert_eq!(resolve_voice("X", &casting, 2).unwrap(), "voice");
        assert!(resolve_voice("X", &casting, 1).is_err());
    }

    #[test]
    fn test_check_casting_collects_errors() {
        let mut casting = casting();
        casting
            .roles
            .insert("PIERRE".to_string(), "homme".to_string());
        let speakers = vec!["JEAN-PIERRE".to_string(), "MARIE".to_string()];

        let errors = check_casting(&speakers, &casting, 8).unwrap_err();
        assert_eq!(errors.len(), 1);

        let ok = check_casting(&speakers[1..], &casting, 8).unwrap();
        assert_eq!(ok, vec![("MARIE".to_string(), "fr-FR-DeniseNeural".to_string())]);
    }

    #[test]
    fn test_load_missing_file_uses_default() {
        let casting = Casting::load(Path::new("/nonexistent/casting.json")).unwrap();
        assert_eq!(casting, Casting::default());
    }
}
