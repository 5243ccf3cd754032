//! Import and export of user-authored data
//!
//! Profiles, pronunciation rule sets and scripts are exchanged as JSON files
//! that people edit by hand, so every import is validated before use.

use serde::{Deserialize, Serialize};

use crate::text::PronunciationRule;
use crate::voice::{PrebuiltVoice, VoiceProfile};
use crate::{Error, Result};

/// Exported profile form; ids are optional on import
#[derive(Debug, Serialize, Deserialize)]
struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    instruction: String,
    base_voice: String,
}

/// Script file with optional rules attached
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptFile {
    #[serde(alias = "text")]
    pub script: String,
    #[serde(default)]
    pub rules: Vec<PronunciationRule>,
    #[serde(default)]
    pub language: Option<String>,
}

fn invalid(e: impl std::fmt::Display) -> Error {
    Error::InvalidImportedData(e.to_string())
}

/// Parse exported voice profiles
///
/// # Errors
///
/// Returns `InvalidImportedData` on malformed JSON, blank names or
/// instructions, or an unknown base voice
pub fn import_profiles(json: &str) -> Result<Vec<VoiceProfile>> {
    let records: Vec<ProfileRecord> = serde_json::from_str(json).map_err(invalid)?;

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            if record.name.trim().is_empty() {
                return Err(invalid(format!("profile {} has no name", i + 1)));
            }
            if record.instruction.trim().is_empty() {
                return Err(invalid(format!("profile '{}' has no instruction", record.name)));
            }
            let base_voice = PrebuiltVoice::new(&record.base_voice)
                .map_err(|_| invalid(format!("profile '{}': unknown base voice '{}'", record.name, record.base_voice)))?;

            let mut profile = VoiceProfile::new(record.name.trim(), record.instruction.trim(), base_voice);
            if let Some(id) = record.id.filter(|id| !id.trim().is_empty()) {
                profile.id = id;
            }
            Ok(profile)
        })
        .collect()
}

/// Serialize profiles in the import format
///
/// # Errors
///
/// Returns error if serialization fails
pub fn export_profiles(profiles: &[VoiceProfile]) -> Result<String> {
    let records: Vec<ProfileRecord> = profiles
        .iter()
        .map(|p| ProfileRecord {
            id: Some(p.id.clone()),
            name: p.name.clone(),
            instruction: p.instruction.clone(),
            base_voice: p.base_voice.name().to_string(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Parse a pronunciation rule set
///
/// # Errors
///
/// Returns `InvalidImportedData` on malformed JSON or a blank word
pub fn import_rules(json: &str) -> Result<Vec<PronunciationRule>> {
    let rules: Vec<PronunciationRule> = serde_json::from_str(json).map_err(invalid)?;
    if let Some(position) = rules.iter().position(|r| r.word.trim().is_empty()) {
        return Err(invalid(format!("rule {} has an empty word", position + 1)));
    }
    Ok(rules)
}

/// Parse a script file
///
/// # Errors
///
/// Returns `InvalidImportedData` on malformed JSON, a blank script or an
/// invalid rule
pub fn import_script(json: &str) -> Result<ScriptFile> {
    let file: ScriptFile = serde_json::from_str(json).map_err(invalid)?;
    if file.script.trim().is_empty() {
        return Err(invalid("script is empty"));
    }
    if file.rules.iter().any(|r| r.word.trim().is_empty()) {
        return Err(invalid("script contains a rule with an empty word"));
    }
    Ok(file)
}
