// Reminder model types for configuration and outward advisories.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The kinds of advisory reminders the scheduler can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKind {
    /// Predicted hostile attack wave.
    AttackWave,
    /// Supply at or past the critical mark; a block is imminent.
    SupplyBlock,
    /// Supply approaching the cap.
    SupplyWarning,
    /// Unspent minerals or gas past the ceiling.
    ResourceOverflow,
    /// Worker production has stalled.
    WorkerProduction,
    /// A tracked upgrade finished.
    UpgradeCompleted,
    /// Mission objective countdown running low.
    ObjectiveTimer,
    /// Commander-specific tactical tip.
    CommanderTip,
}

impl ReminderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AttackWave => "Attack Wave",
            Self::SupplyBlock => "Supply Block",
            Self::SupplyWarning => "Supply Warning",
            Self::ResourceOverflow => "Resource Overflow",
            Self::WorkerProduction => "Worker Production",
            Self::UpgradeCompleted => "Upgrade Complete",
            Self::ObjectiveTimer => "Objective Timer",
            Self::CommanderTip => "Commander Tip",
        }
    }

    /// Get all reminder kinds.
    pub fn all() -> &'static [ReminderKind] {
        &[
            Self::AttackWave,
            Self::SupplyBlock,
            Self::SupplyWarning,
            Self::ResourceOverflow,
            Self::WorkerProduction,
            Self::UpgradeCompleted,
            Self::ObjectiveTimer,
            Self::CommanderTip,
        ]
    }

    /// Severity tier used to order concurrent deliveries.
    pub fn severity(&self) -> Severity {
        match self {
            Self::AttackWave | Self::SupplyBlock | Self::ObjectiveTimer => Severity::Critical,
            Self::SupplyWarning
            | Self::ResourceOverflow
            | Self::WorkerProduction
            | Self::UpgradeCompleted => Severity::Macro,
            Self::CommanderTip => Severity::Tip,
        }
    }
}

/// Advisory severity. Ordering is by urgency: incoming attacks and supply
/// blocks outrank macro reminders, which outrank strategy tips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Tip,
    Macro,
    Critical,
}

/// Per-kind scheduling configuration, persisted in settings.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRuleConfig {
    pub enabled: bool,
    /// Seconds after a delivery during which the same key is suppressed.
    pub cooldown_secs: u64,
    /// Seconds an undelivered reminder stays valid before it is dropped.
    pub ttl_secs: u64,
}

impl ReminderRuleConfig {
    /// Default configuration for a kind.
    pub fn for_kind(kind: ReminderKind) -> Self {
        let cooldown_secs = match kind {
            ReminderKind::AttackWave => 45,
            ReminderKind::SupplyBlock => 20,
            ReminderKind::UpgradeCompleted => 60,
            ReminderKind::CommanderTip => 120,
            _ => 30,
        };
        Self {
            enabled: true,
            cooldown_secs,
            ttl_secs: 15,
        }
    }
}

impl Default for ReminderRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 30,
            ttl_secs: 15,
        }
    }
}

/// Deduplication key: the reminder kind plus a payload discriminant such as
/// which resource overflowed or which upgrade finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub kind: ReminderKind,
    pub discriminant: String,
}

impl ReminderKey {
    pub fn new(kind: ReminderKind, discriminant: impl Into<String>) -> Self {
        Self {
            kind,
            discriminant: discriminant.into(),
        }
    }

    pub fn bare(kind: ReminderKind) -> Self {
        Self::new(kind, "")
    }
}

/// An outward advisory message. Session-scoped: discarded after expiry or
/// delivery, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub key: ReminderKey,
    pub severity: Severity,
    pub message: String,
    /// Timestamp of the event that created the reminder.
    pub created_at: Duration,
    /// Earliest time the sink should show this reminder.
    pub display_after: Duration,
    /// After this time the reminder is stale and must not be shown.
    pub expires_at: Duration,
    /// Whether this reminder has already been handed to the sink.
    #[serde(default)]
    pub delivered: bool,
}
