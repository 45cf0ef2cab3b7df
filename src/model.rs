use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A `(keycode, column)` position in the X keyboard mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeySlot {
    pub keycode: u8,
    /// Shift-level column within the keycode's row.
    pub index: u8,
}

impl KeySlot {
    pub fn new(keycode: u8, index: u8) -> Self {
        Self { keycode, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Pressed,
    Released,
}

pub const SCRIPT_VERSION: u32 = 1;

/// A typing script: text runs, key chords and pauses played in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub version: u32,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Text { text: String },
    Chord { keys: Vec<String> },
    Wait { ms: u64 },
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse typing script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid script {}", path.display()))
    }
}
