//! Temporal state machine: folds observations into the game-state model
//! and emits domain events.
//!
//! Every rule is driven by observation timestamps, never the wall clock,
//! so a given (model, observation) pair always produces the same events.
//! Each rule carries its own debounce state to avoid flapping on noisy
//! confirmations; a rejected field simply skips its rule for the cycle.

use std::time::Duration;

use log::{debug, info};

use super::config::{AcceptanceThresholds, DetectionConfig};
use super::model::{
    DomainEvent, DomainEventKind, GamePhase, Observation, Resource, UpgradeSlot,
};
use super::state::{accept, GameStateModel};

/// Rising-edge gate with a debounced re-arm: after firing, the condition
/// must stay clear for the re-arm window before the gate can fire again.
/// Brief dips below the threshold stay inside one episode.
#[derive(Debug, Clone)]
struct EdgeGate {
    armed: bool,
    clear_since: Option<Duration>,
}

impl EdgeGate {
    fn new() -> Self {
        Self {
            armed: true,
            clear_since: None,
        }
    }

    /// Returns true when the gate fires on this update.
    fn update(&mut self, active: bool, now: Duration, rearm: Duration) -> bool {
        if active {
            self.clear_since = None;
            if self.armed {
                self.armed = false;
                return true;
            }
            false
        } else {
            let since = *self.clear_since.get_or_insert(now);
            if !self.armed && now.saturating_sub(since) >= rearm {
                self.armed = true;
                self.clear_since = None;
            }
            false
        }
    }
}

/// Like [`EdgeGate`], but the condition must hold for a sustain window
/// before firing, filtering transient spikes.
#[derive(Debug, Clone)]
struct SustainGate {
    armed: bool,
    active_since: Option<Duration>,
    clear_since: Option<Duration>,
}

impl SustainGate {
    fn new() -> Self {
        Self {
            armed: true,
            active_since: None,
            clear_since: None,
        }
    }

    fn update(&mut self, active: bool, now: Duration, sustain: Duration, rearm: Duration) -> bool {
        if active {
            self.clear_since = None;
            let since = *self.active_since.get_or_insert(now);
            if self.armed && now.saturating_sub(since) >= sustain {
                self.armed = false;
                return true;
            }
            false
        } else {
            self.active_since = None;
            let since = *self.clear_since.get_or_insert(now);
            if !self.armed && now.saturating_sub(since) >= rearm {
                self.armed = true;
                self.clear_since = None;
            }
            false
        }
    }
}

/// Folds a stream of observations into [`GameStateModel`] and emits
/// domain events. Owns the model for the session's lifetime.
pub struct EventDetector {
    config: DetectionConfig,
    acceptance: AcceptanceThresholds,
    model: GameStateModel,
    supply_warn: EdgeGate,
    supply_block: EdgeGate,
    mineral_overflow: SustainGate,
    gas_overflow: SustainGate,
    /// Worker count at which the current stall fired; None when armed.
    stalled_at: Option<u32>,
    /// Whether the current wave prediction has already been announced.
    wave_warned: bool,
    objective_armed: bool,
    phase: Option<GamePhase>,
}

impl EventDetector {
    pub fn new(config: DetectionConfig, acceptance: AcceptanceThresholds) -> Self {
        Self {
            config,
            acceptance,
            model: GameStateModel::new(),
            supply_warn: EdgeGate::new(),
            supply_block: EdgeGate::new(),
            mineral_overflow: SustainGate::new(),
            gas_overflow: SustainGate::new(),
            stalled_at: None,
            wave_warned: false,
            objective_armed: true,
            phase: None,
        }
    }

    pub fn model(&self) -> &GameStateModel {
        &self.model
    }

    /// The session's confirmed commander identity, if recognized yet.
    pub fn commander(&self) -> Option<&str> {
        self.model.commander.as_ref().map(|c| c.value.as_str())
    }

    /// Discard all session state. The only way state crosses a match
    /// boundary is by not calling this.
    pub fn reset(&mut self) {
        info!("detector reset: discarding game state model");
        *self = Self::new(self.config.clone(), self.acceptance.clone());
    }

    /// Fold one observation into the model and return the events it
    /// triggered, most urgent first.
    pub fn observe(&mut self, obs: &Observation) -> Vec<DomainEvent> {
        let now = obs.captured_at;
        let mut events = Vec::new();

        // Snapshot pre-update values needed for edge rules.
        let prev_workers = self.model.workers.as_ref().map(|c| c.value);
        let prev_attack = self.model.attack_upgrade.as_ref().map(|c| c.value);
        let prev_armor = self.model.armor_upgrade.as_ref().map(|c| c.value);
        let prev_red = self.model.red_points.as_ref().map(|c| c.value);

        // Fold accepted fields into the model. Each field is independent:
        // one rejected field never blocks the others.
        let a = &self.acceptance;
        let minerals_updated = accept(&mut self.model.minerals, &obs.minerals, a.minerals, now);
        let gas_updated = accept(&mut self.model.gas, &obs.gas, a.gas, now);
        let supply_updated = accept(&mut self.model.supply, &obs.supply, a.supply, now);
        let workers_updated = accept(&mut self.model.workers, &obs.workers, a.workers, now);
        let elapsed_updated = self.model.accept_elapsed(&obs.game_time, a.game_time, now);
        let attack_updated = accept(
            &mut self.model.attack_upgrade,
            &obs.attack_upgrade,
            a.upgrades,
            now,
        );
        let armor_updated = accept(
            &mut self.model.armor_upgrade,
            &obs.armor_upgrade,
            a.upgrades,
            now,
        );
        let red_updated = accept(&mut self.model.red_points, &obs.red_points, a.red_points, now);
        let objective_updated = accept(
            &mut self.model.objective_timer,
            &obs.objective_timer,
            a.objective_timer,
            now,
        );
        accept(&mut self.model.commander, &obs.commander, a.commander, now);

        if workers_updated {
            self.track_workers(prev_workers, now);
        }
        if red_updated {
            self.track_waves(prev_red, now);
        }

        // Rules, most urgent first.
        if let Some(event) = self.predict_wave(now) {
            events.push(event);
        }
        if supply_updated {
            events.extend(self.check_supply(now));
        }
        if minerals_updated {
            events.extend(self.check_overflow(Resource::Minerals, now));
        }
        if gas_updated {
            events.extend(self.check_overflow(Resource::Gas, now));
        }
        if workers_updated {
            events.extend(self.check_stall(now));
        }
        if attack_updated {
            events.extend(self.check_upgrade(UpgradeSlot::Attack, prev_attack, now));
        }
        if armor_updated {
            events.extend(self.check_upgrade(UpgradeSlot::Armor, prev_armor, now));
        }
        if objective_updated {
            events.extend(self.check_objective(now));
        }
        if elapsed_updated {
            events.extend(self.check_phase(now));
        }

        events
    }

    fn track_workers(&mut self, prev: Option<u32>, now: Duration) {
        let Some(current) = self.model.workers.as_ref().map(|c| c.value) else {
            return;
        };
        self.model
            .push_worker_history(current, now, self.config.worker_history_len);

        // A stall episode only re-arms once production visibly resumes.
        if let (Some(p), Some(_)) = (prev, self.stalled_at) {
            if current > p {
                debug!("worker production resumed at {}", current);
                self.stalled_at = None;
            }
        }
    }

    fn track_waves(&mut self, prev: Option<u32>, now: Duration) {
        let Some(current) = self.model.red_points.as_ref().map(|c| c.value) else {
            return;
        };
        // A wave is confirmed when indicators appear after a clear minimap.
        if prev.unwrap_or(0) > 0 || current == 0 {
            return;
        }

        if let Some(&last) = self.model.wave_times.last() {
            let gap = now.saturating_sub(last);
            self.model.wave_times.push(now);
            let window = self.config.wave_interval_window.max(1);
            let gaps: Vec<Duration> = self
                .model
                .wave_times
                .windows(2)
                .rev()
                .take(window)
                .map(|w| w[1].saturating_sub(w[0]))
                .collect();
            let total: Duration = gaps.iter().sum();
            self.model.wave_interval = Some(total / gaps.len() as u32);
            info!(
                "attack wave confirmed at {:?} (gap {:?}, interval estimate {:?})",
                now, gap, self.model.wave_interval
            );
        } else {
            // First wave of the session: start from the configured baseline
            // until a real gap has been measured.
            self.model.wave_times.push(now);
            self.model.wave_interval =
                Some(Duration::from_secs(self.config.baseline_wave_interval_secs));
            info!("first attack wave confirmed at {:?}", now);
        }
        self.wave_warned = false;
    }

    /// Predict the next wave from confirmed history. With no confirmed wave
    /// this session there is nothing to predict; that is an unknown state,
    /// not an error.
    fn predict_wave(&mut self, now: Duration) -> Option<DomainEvent> {
        let last = *self.model.wave_times.last()?;
        let interval = self.model.wave_interval?;
        if self.wave_warned {
            return None;
        }
        let predicted = last + interval;
        if now >= predicted {
            // The window passed without a warning opportunity; skip rather
            // than announce a wave that is already due.
            self.wave_warned = true;
            return None;
        }
        let lead = Duration::from_secs(self.config.wave_lead_secs);
        if predicted.saturating_sub(now) <= lead {
            self.wave_warned = true;
            let eta = predicted - now;
            return Some(DomainEvent {
                at: now,
                kind: DomainEventKind::AttackWaveImminent { eta },
            });
        }
        None
    }

    fn check_supply(&mut self, now: Duration) -> Vec<DomainEvent> {
        let Some(supply) = self.model.supply.as_ref().map(|c| c.value) else {
            return Vec::new();
        };
        let ratio = supply.ratio();
        let rearm = Duration::from_secs(self.config.supply_rearm_secs);

        let block_fired = self
            .supply_block
            .update(ratio >= self.config.supply_critical, now, rearm);
        let warn_fired = self
            .supply_warn
            .update(ratio >= self.config.supply_high_water, now, rearm);

        let mut events = Vec::new();
        if block_fired {
            events.push(DomainEvent {
                at: now,
                kind: DomainEventKind::SupplyBlockCritical {
                    used: supply.used,
                    cap: supply.cap,
                },
            });
        } else if warn_fired {
            events.push(DomainEvent {
                at: now,
                kind: DomainEventKind::SupplyNearCap {
                    used: supply.used,
                    cap: supply.cap,
                },
            });
        }
        events
    }

    fn check_overflow(&mut self, resource: Resource, now: Duration) -> Vec<DomainEvent> {
        let banked = match resource {
            Resource::Minerals => self.model.minerals.as_ref().map(|c| c.value),
            Resource::Gas => self.model.gas.as_ref().map(|c| c.value),
        };
        let Some(banked) = banked else {
            return Vec::new();
        };

        // Banking is normal while the economy spins up.
        let grace = Duration::from_secs(self.config.overflow_grace_secs);
        if self.model.elapsed.as_ref().map_or(true, |e| e.value < grace) {
            return Vec::new();
        }

        let gate = match resource {
            Resource::Minerals => &mut self.mineral_overflow,
            Resource::Gas => &mut self.gas_overflow,
        };
        let fired = gate.update(
            banked > self.config.overflow_ceiling,
            now,
            Duration::from_secs(self.config.overflow_sustain_secs),
            Duration::from_secs(self.config.overflow_rearm_secs),
        );
        if fired {
            vec![DomainEvent {
                at: now,
                kind: DomainEventKind::ResourceOverflow { resource, banked },
            }]
        } else {
            Vec::new()
        }
    }

    fn check_stall(&mut self, now: Duration) -> Vec<DomainEvent> {
        if self.stalled_at.is_some() {
            return Vec::new();
        }
        let history = &self.model.worker_history;
        let Some(last) = history.back() else {
            return Vec::new();
        };
        // Trailing run of identical confirmed counts: the current plateau.
        let mut run_start = last.at;
        let mut run_len = 0usize;
        for confirmed in history.iter().rev() {
            if confirmed.value != last.value {
                break;
            }
            run_start = confirmed.at;
            run_len += 1;
        }
        if run_len < 2 {
            return Vec::new();
        }
        let span = last.at.saturating_sub(run_start);
        if span < Duration::from_secs(self.config.stall_interval_secs) {
            return Vec::new();
        }
        // At saturation, stopping worker production is deliberate.
        if last.value >= self.config.worker_saturation_cap {
            return Vec::new();
        }
        self.stalled_at = Some(last.value);
        vec![DomainEvent {
            at: now,
            kind: DomainEventKind::WorkerProductionStalled {
                workers: last.value,
            },
        }]
    }

    fn check_upgrade(
        &mut self,
        slot: UpgradeSlot,
        prev: Option<f32>,
        now: Duration,
    ) -> Vec<DomainEvent> {
        let current = match slot {
            UpgradeSlot::Attack => self.model.attack_upgrade.as_ref().map(|c| c.value),
            UpgradeSlot::Armor => self.model.armor_upgrade.as_ref().map(|c| c.value),
        };
        let (Some(prev), Some(current)) = (prev, current) else {
            return Vec::new();
        };
        if prev < 1.0 && current >= 1.0 {
            vec![DomainEvent {
                at: now,
                kind: DomainEventKind::UpgradeCompleted { slot },
            }]
        } else {
            Vec::new()
        }
    }

    fn check_objective(&mut self, now: Duration) -> Vec<DomainEvent> {
        let Some(remaining) = self.model.objective_timer.as_ref().map(|c| c.value) else {
            return Vec::new();
        };
        let threshold = Duration::from_secs(self.config.objective_warning_secs);
        if remaining > threshold {
            self.objective_armed = true;
            return Vec::new();
        }
        if !self.objective_armed {
            return Vec::new();
        }
        self.objective_armed = false;
        vec![DomainEvent {
            at: now,
            kind: DomainEventKind::ObjectiveTimerLow { remaining },
        }]
    }

    fn check_phase(&mut self, now: Duration) -> Vec<DomainEvent> {
        let Some(elapsed) = self.model.elapsed.as_ref().map(|c| c.value) else {
            return Vec::new();
        };
        let phase = if elapsed < Duration::from_secs(self.config.phase_mid_start_secs) {
            GamePhase::Early
        } else if elapsed < Duration::from_secs(self.config.phase_late_start_secs) {
            GamePhase::Mid
        } else {
            GamePhase::Late
        };
        if self.phase == Some(phase) {
            return Vec::new();
        }
        self.phase = Some(phase);
        vec![DomainEvent {
            at: now,
            kind: DomainEventKind::GamePhaseChanged { phase },
        }]
    }
}
