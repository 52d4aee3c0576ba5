use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use super::alerts::model::{ReminderKind, ReminderRuleConfig};

/// Application settings with every detection threshold and window.
///
/// All values are externally settable; the defaults below are a starting
/// point, not part of the pipeline contract.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Path to the commander knowledge data file.
    #[serde(default = "default_commander_data_path")]
    pub commander_data_path: PathBuf,
    /// Sampling cadence of the capture loop in milliseconds (default 1000).
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    /// Upper bound on one recognition pass in milliseconds (default 800).
    /// A pass that exceeds it is treated as all-unrecognized, not an error.
    #[serde(default = "default_recognition_timeout_ms")]
    pub recognition_timeout_ms: u64,
    /// Maximum reminders buffered for the sink; oldest are dropped beyond
    /// this (default 16).
    #[serde(default = "default_delivery_queue_len")]
    pub delivery_queue_len: usize,
    #[serde(default)]
    pub limits: PlausibilityLimits,
    #[serde(default)]
    pub acceptance: AcceptanceThresholds,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

fn default_commander_data_path() -> PathBuf {
    PathBuf::from("data/commanders.json")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            commander_data_path: default_commander_data_path(),
            sampling_interval_ms: default_sampling_interval_ms(),
            recognition_timeout_ms: default_recognition_timeout_ms(),
            delivery_queue_len: default_delivery_queue_len(),
            limits: PlausibilityLimits::default(),
            acceptance: AcceptanceThresholds::default(),
            detection: DetectionConfig::default(),
            reminders: ReminderConfig::default(),
        }
    }
}

fn default_sampling_interval_ms() -> u64 {
    1000
}

fn default_recognition_timeout_ms() -> u64 {
    800
}

fn default_delivery_queue_len() -> usize {
    16
}

/// Hard plausibility bounds applied during normalization. A reading outside
/// these bounds is marked invalid rather than trusted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlausibilityLimits {
    /// Hard supply cap of the game (default 200).
    pub supply_hard_cap: u32,
    /// Largest believable resource bank (default 50000).
    pub max_resource_bank: u32,
    /// Largest believable worker count (default 200).
    pub max_workers: u32,
    /// Longest believable mission, in seconds (default 4 hours).
    pub max_mission_secs: u64,
    /// Most red-point indicators one minimap can plausibly show (default 50).
    pub max_red_points: u32,
    /// Longest believable objective countdown in seconds (default 1 hour).
    pub max_objective_secs: u64,
}

impl Default for PlausibilityLimits {
    fn default() -> Self {
        Self {
            supply_hard_cap: 200,
            max_resource_bank: 50_000,
            max_workers: 200,
            max_mission_secs: 4 * 3600,
            max_red_points: 50,
            max_objective_secs: 3600,
        }
    }
}

/// Per-field confidence required before a reading replaces confirmed state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcceptanceThresholds {
    pub minerals: f32,
    pub gas: f32,
    pub supply: f32,
    pub workers: f32,
    pub game_time: f32,
    pub upgrades: f32,
    pub red_points: f32,
    pub objective_timer: f32,
    pub commander: f32,
}

impl Default for AcceptanceThresholds {
    fn default() -> Self {
        Self {
            minerals: 0.5,
            gas: 0.5,
            supply: 0.6,
            workers: 0.6,
            game_time: 0.7,
            upgrades: 0.6,
            red_points: 0.5,
            objective_timer: 0.7,
            commander: 0.8,
        }
    }
}

/// Detection rule thresholds and debounce windows.
///
/// Debounce windows are measured against capture timestamps; mission-time
/// boundaries (phases, overflow grace) against the in-game clock.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Supply ratio high-water mark (default 0.90).
    pub supply_high_water: f32,
    /// Supply ratio critical mark (default 0.95).
    pub supply_critical: f32,
    /// Seconds the ratio must stay below a mark before that rule re-arms
    /// (default 15).
    pub supply_rearm_secs: u64,
    /// Banked-resource ceiling for overflow detection (default 1000).
    pub overflow_ceiling: u32,
    /// Seconds the bank must stay above the ceiling before overflow fires
    /// (default 10).
    pub overflow_sustain_secs: u64,
    /// Seconds the bank must stay at/below the ceiling before the overflow
    /// rule re-arms (default 30).
    pub overflow_rearm_secs: u64,
    /// No overflow reminders before this much mission time (default 180).
    pub overflow_grace_secs: u64,
    /// Seconds of unchanged worker count that count as a stall (default 30).
    pub stall_interval_secs: u64,
    /// Confirmed worker counts kept for stagnation detection (default 32).
    pub worker_history_len: usize,
    /// Worker count at which production is considered intentionally stopped;
    /// no stall reminders at or above it (default 70).
    pub worker_saturation_cap: u32,
    /// Warn this many seconds before a predicted attack wave (default 30).
    pub wave_lead_secs: u64,
    /// Inter-wave interval assumed after the first confirmed wave, before
    /// any gap has been measured (default 240).
    pub baseline_wave_interval_secs: u64,
    /// Confirmed inter-wave gaps averaged for the interval estimate
    /// (default 4).
    pub wave_interval_window: usize,
    /// Objective countdown warning threshold in seconds (default 60).
    pub objective_warning_secs: u64,
    /// Mission time at which the mid game starts (default 300).
    pub phase_mid_start_secs: u64,
    /// Mission time at which the late game starts (default 720).
    pub phase_late_start_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            supply_high_water: 0.90,
            supply_critical: 0.95,
            supply_rearm_secs: 15,
            overflow_ceiling: 1000,
            overflow_sustain_secs: 10,
            overflow_rearm_secs: 30,
            overflow_grace_secs: 180,
            stall_interval_secs: 30,
            worker_history_len: 32,
            worker_saturation_cap: 70,
            wave_lead_secs: 30,
            baseline_wave_interval_secs: 240,
            wave_interval_window: 4,
            objective_warning_secs: 60,
            phase_mid_start_secs: 300,
            phase_late_start_secs: 720,
        }
    }
}

/// Reminder scheduling configuration: per-kind rules plus shared knobs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReminderConfig {
    /// Per-kind configuration (enabled, cooldown, time-to-live).
    #[serde(default = "default_rules")]
    pub rules: HashMap<ReminderKind, ReminderRuleConfig>,
    /// An attack-wave ETA revision smaller than this is not considered a
    /// material change (default 5).
    #[serde(default = "default_eta_tolerance_secs")]
    pub eta_update_tolerance_secs: u64,
    /// Delivered reminders kept in the session history ring (default 50).
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

fn default_rules() -> HashMap<ReminderKind, ReminderRuleConfig> {
    ReminderKind::all()
        .iter()
        .map(|kind| (*kind, ReminderRuleConfig::for_kind(*kind)))
        .collect()
}

fn default_eta_tolerance_secs() -> u64 {
    5
}

fn default_history_len() -> usize {
    50
}

impl ReminderConfig {
    /// Config with every reminder kind enabled at its default settings.
    pub fn default_enabled() -> Self {
        Self {
            rules: default_rules(),
            eta_update_tolerance_secs: default_eta_tolerance_secs(),
            history_len: default_history_len(),
        }
    }

    pub fn is_enabled(&self, kind: ReminderKind) -> bool {
        self.rules.get(&kind).map(|r| r.enabled).unwrap_or(false)
    }

    pub fn cooldown(&self, kind: ReminderKind) -> std::time::Duration {
        let secs = self
            .rules
            .get(&kind)
            .map(|r| r.cooldown_secs)
            .unwrap_or_else(|| ReminderRuleConfig::for_kind(kind).cooldown_secs);
        std::time::Duration::from_secs(secs)
    }

    pub fn ttl(&self, kind: ReminderKind) -> std::time::Duration {
        let secs = self
            .rules
            .get(&kind)
            .map(|r| r.ttl_secs)
            .unwrap_or_else(|| ReminderRuleConfig::for_kind(kind).ttl_secs);
        std::time::Duration::from_secs(secs)
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self::default_enabled()
    }
}

/// Loads and saves settings.json in a given config directory.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults on a missing or unreadable
    /// file. A malformed file is reported but never fatal.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => warn!(
                        "malformed settings at {:?}, using defaults: {}",
                        self.config_path, e
                    ),
                },
                Err(e) => warn!(
                    "could not read settings at {:?}, using defaults: {}",
                    self.config_path, e
                ),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load();
        assert_eq!(default.sampling_interval_ms, 1000);

        let mut settings = Settings::default();
        settings.sampling_interval_ms = 500;
        settings.detection.supply_high_water = 0.85;

        manager.save(&settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.sampling_interval_ms, 500);
        assert!((loaded.detection.supply_high_water - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ not json").unwrap();

        let manager = ConfigManager::new(dir.path().to_path_buf());
        let settings = manager.load();
        assert_eq!(settings.delivery_queue_len, 16);
    }

    #[test]
    fn test_all_reminder_kinds_enabled_by_default() {
        let config = ReminderConfig::default();
        for kind in ReminderKind::all() {
            assert!(config.is_enabled(*kind), "{:?} should default enabled", kind);
        }
    }
}
