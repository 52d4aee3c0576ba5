//! Read-only knowledge store of co-op commander strategies.
//!
//! Loaded once from a JSON data file and only ever queried; the pipeline
//! never mutates commander data.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::GamePhase;

#[derive(Debug, Error)]
pub enum CommanderStoreError {
    #[error("could not read commander data: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed commander data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Static record for one commander.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommanderProfile {
    pub name: String,
    #[serde(default)]
    pub tips: PhaseTips,
    #[serde(default)]
    pub prestiges: Vec<PrestigeNote>,
    #[serde(default)]
    pub power_spikes: Vec<PowerSpike>,
    #[serde(default)]
    pub synergy_notes: Vec<String>,
}

impl CommanderProfile {
    pub fn tip(&self, phase: GamePhase) -> Option<&str> {
        let tip = match phase {
            GamePhase::Early => &self.tips.early,
            GamePhase::Mid => &self.tips.mid,
            GamePhase::Late => &self.tips.late,
        };
        tip.as_deref()
    }

    /// The recommended prestige, by convention the first listed.
    pub fn recommended_prestige(&self) -> Option<&PrestigeNote> {
        self.prestiges.first()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTips {
    pub early: Option<String>,
    pub mid: Option<String>,
    pub late: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrestigeNote {
    pub name: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSpike {
    /// Mission time in seconds at which the spike comes online.
    pub at_secs: u64,
    pub note: String,
}

/// On-disk shape of the commander data file.
#[derive(Debug, Deserialize)]
struct CommanderDataFile {
    commanders: Vec<CommanderProfile>,
}

/// Keyed lookup over all known commanders. Lookups are case-insensitive
/// because the commander name arrives via OCR.
#[derive(Debug, Default)]
pub struct CommanderStore {
    profiles: HashMap<String, CommanderProfile>,
}

impl CommanderStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CommanderStoreError> {
        let content = fs::read_to_string(path)?;
        let data: CommanderDataFile = serde_json::from_str(&content)?;
        Ok(Self::from_profiles(data.commanders))
    }

    pub fn from_profiles(profiles: Vec<CommanderProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p))
            .collect();
        Self { profiles }
    }

    /// Look up a commander by name, or None for an unknown commander.
    pub fn get(&self, name: &str) -> Option<&CommanderProfile> {
        self.profiles.get(&name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
