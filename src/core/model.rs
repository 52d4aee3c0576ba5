use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical screen fields the recognition engine is asked to read.
///
/// Each field corresponds to one named capture region; the recognition
/// collaborator reports raw text plus a confidence score per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldId {
    Minerals,
    Gas,
    Supply,
    Workers,
    GameTime,
    AttackUpgrade,
    ArmorUpgrade,
    RedPoints,
    ObjectiveTimer,
    Commander,
}

impl FieldId {
    /// All fields the pipeline tracks.
    pub fn all() -> &'static [FieldId] {
        &[
            Self::Minerals,
            Self::Gas,
            Self::Supply,
            Self::Workers,
            Self::GameTime,
            Self::AttackUpgrade,
            Self::ArmorUpgrade,
            Self::RedPoints,
            Self::ObjectiveTimer,
            Self::Commander,
        ]
    }
}

/// One recognized region: the raw text the engine read, plus its
/// self-reported confidence. Confidence is clamped during normalization,
/// so values straight from an engine may lie outside [0,1] here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub text: String,
    pub confidence: f32,
}

impl RawReading {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Per-frame recognition output before normalization.
///
/// Fields the engine could not read at all are simply absent from the map;
/// an explicit "unrecognized" result and a missing entry are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Capture timestamp as a duration since the Unix epoch.
    pub captured_at: Duration,
    pub fields: HashMap<FieldId, RawReading>,
}

impl RawFrame {
    /// A frame on which recognition produced nothing, e.g. after a timeout.
    pub fn unrecognized(captured_at: Duration) -> Self {
        Self {
            captured_at,
            fields: HashMap::new(),
        }
    }
}

/// A typed field value carrying the recognition confidence in [0,1].
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub confidence: f32,
}

impl<T> Reading<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

/// An observation field: `None` means the field was missing, unparseable
/// or implausible this frame. A `None` field never overwrites confirmed
/// state downstream.
pub type Field<T> = Option<Reading<T>>;

/// Supply as shown in the top bar, e.g. "87/100".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub used: u32,
    pub cap: u32,
}

impl Supply {
    pub fn ratio(&self) -> f32 {
        if self.cap == 0 {
            0.0
        } else {
            self.used as f32 / self.cap as f32
        }
    }
}

/// The tracked upgrade lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeSlot {
    Attack,
    Armor,
}

impl UpgradeSlot {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Attack => "Attack",
            Self::Armor => "Armor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Minerals,
    Gas,
}

impl Resource {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Minerals => "minerals",
            Self::Gas => "gas",
        }
    }
}

/// Coarse mission progress, used to pick commander tips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Early,
    Mid,
    Late,
}

impl GamePhase {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Mid => "mid",
            Self::Late => "late",
        }
    }
}

/// One frame's normalized, confidence-annotated view of the game.
///
/// Every field is best-effort: normalization never fails, it only marks
/// fields invalid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Capture timestamp as a duration since the Unix epoch.
    pub captured_at: Duration,
    pub minerals: Field<u32>,
    pub gas: Field<u32>,
    pub supply: Field<Supply>,
    pub workers: Field<u32>,
    /// Elapsed mission time as read from the in-game clock.
    pub game_time: Field<Duration>,
    /// Completion ratio in [0,1] for the attack upgrade in progress.
    pub attack_upgrade: Field<f32>,
    /// Completion ratio in [0,1] for the armor upgrade in progress.
    pub armor_upgrade: Field<f32>,
    /// Number of hostile "red point" indicators visible on the minimap.
    pub red_points: Field<u32>,
    /// Remaining time on the mission objective countdown, if one is shown.
    pub objective_timer: Field<Duration>,
    pub commander: Field<String>,
}

/// A discrete detected occurrence warranting possible advisory action.
/// Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    /// Capture timestamp of the observation that triggered the event.
    pub at: Duration,
    pub kind: DomainEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEventKind {
    /// Supply ratio crossed the configured high-water mark.
    SupplyNearCap { used: u32, cap: u32 },
    /// Supply ratio crossed the critical (near-block) mark.
    SupplyBlockCritical { used: u32, cap: u32 },
    /// Banked resources stayed above the ceiling for the sustain window.
    ResourceOverflow { resource: Resource, banked: u32 },
    /// Worker count unchanged across the history window.
    WorkerProductionStalled { workers: u32 },
    /// A tracked upgrade reached completion.
    UpgradeCompleted { slot: UpgradeSlot },
    /// A hostile attack wave is predicted within the lead time.
    AttackWaveImminent { eta: Duration },
    /// The objective countdown fell to the warning threshold.
    ObjectiveTimerLow { remaining: Duration },
    /// Mission progressed into a new phase.
    GamePhaseChanged { phase: GamePhase },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_ratio() {
        let supply = Supply { used: 90, cap: 100 };
        assert!((supply.ratio() - 0.9).abs() < f32::EPSILON);

        let empty = Supply { used: 10, cap: 0 };
        assert_eq!(empty.ratio(), 0.0);
    }

    #[test]
    fn test_field_ids_cover_display_fields() {
        assert_eq!(FieldId::all().len(), 10);
    }

    #[test]
    fn test_raw_frame_roundtrip() {
        let mut frame = RawFrame::unrecognized(Duration::from_secs(1000));
        frame
            .fields
            .insert(FieldId::Supply, RawReading::new("87/100", 0.93));

        let json = serde_json::to_string(&frame).unwrap();
        let back: RawFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
