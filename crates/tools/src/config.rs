use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors loading an inspector configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A key combination that toggles the inspector panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: char,
}

impl KeyChord {
    pub fn new(ctrl: bool, shift: bool, alt: bool, key: char) -> Self {
        Self {
            ctrl,
            shift,
            alt,
            key,
        }
    }

    /// Whether a pressed chord triggers this one. Letter case is ignored
    /// because shift changes the reported key.
    pub fn matches(&self, pressed: &KeyChord) -> bool {
        self.ctrl == pressed.ctrl
            && self.shift == pressed.shift
            && self.alt == pressed.alt
            && self.key.eq_ignore_ascii_case(&pressed.key)
    }
}

impl Default for KeyChord {
    fn default() -> Self {
        Self::new(true, true, false, 'K')
    }
}

impl std::fmt::Display for KeyChord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key.to_ascii_uppercase())
    }
}

/// Inspector settings. Every field has a default, so a partial JSON object
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Display name, also used as the export file prefix.
    pub name: String,
    /// When false, [`crate::instrument`] attaches nothing.
    pub enabled: bool,
    /// Maximum number of history entries kept.
    pub max_history: usize,
    /// Record actions and effects in the action log.
    pub log_actions: bool,
    pub toggle_key: KeyChord,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            name: "Strata Store".into(),
            enabled: true,
            max_history: 50,
            log_actions: true,
            toggle_key: KeyChord::default(),
        }
    }
}

impl InspectorConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
