//! Reminder scheduler: turns domain events into deduplicated, prioritized,
//! time-bounded advisories.
//!
//! All timing is driven by event timestamps, so a replayed event stream
//! schedules identically. The scheduler owns the set of currently active
//! reminders; one `process` call consumes one detection pass atomically.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use log::{debug, info};

use super::model::{Reminder, ReminderKey, ReminderKind};
use crate::core::commanders::CommanderStore;
use crate::core::config::ReminderConfig;
use crate::core::model::{DomainEvent, DomainEventKind, GamePhase, Resource, UpgradeSlot};

struct Draft {
    key: ReminderKey,
    message: String,
    /// Overrides the kind's configured time-to-live when set; used for
    /// wave warnings, which are stale the moment the wave lands.
    ttl_override: Option<Duration>,
}

pub struct ReminderScheduler {
    config: ReminderConfig,
    commanders: CommanderStore,
    /// The session's confirmed commander identity, once recognized.
    commander: Option<String>,
    /// Reminders created and not yet expired, delivered or not.
    active: HashMap<ReminderKey, Reminder>,
    /// Last delivery time per key, for cooldown suppression.
    last_delivered: HashMap<ReminderKey, Duration>,
    /// Bounded ring of delivered reminders for the status surface.
    history: VecDeque<Reminder>,
}

impl ReminderScheduler {
    pub fn new(config: ReminderConfig, commanders: CommanderStore) -> Self {
        Self {
            config,
            commanders,
            commander: None,
            active: HashMap::new(),
            last_delivered: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    /// Record the session's commander identity once the detector has
    /// confirmed it. Commander-specific content stays withheld until then.
    pub fn set_commander(&mut self, name: &str) {
        if self.commander.as_deref() != Some(name) {
            info!("commander identified: {}", name);
            self.commander = Some(name.to_string());
        }
    }

    /// Delivered reminders this session, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Reminder> {
        self.history.iter()
    }

    /// Discard all session state (new match).
    pub fn reset(&mut self) {
        info!("scheduler reset: discarding active reminders");
        self.commander = None;
        self.active.clear();
        self.last_delivered.clear();
        self.history.clear();
    }

    /// Consume one detection pass and return the reminders to deliver now,
    /// most severe first.
    pub fn process(&mut self, events: &[DomainEvent], now: Duration) -> Vec<Reminder> {
        self.prune_expired(now);
        for event in events {
            if let Some(draft) = self.draft(event) {
                self.admit(draft, now);
            }
        }
        self.collect_due(now)
    }

    /// Drop expired reminders. An expired, undelivered reminder is stale
    /// advice and is never retried.
    fn prune_expired(&mut self, now: Duration) {
        self.active.retain(|key, reminder| {
            let live = reminder.expires_at > now;
            if !live && !reminder.delivered {
                debug!("dropping expired undelivered reminder {:?}", key);
            }
            live
        });
    }

    /// Assemble advisory content for an event, or None when the reminder
    /// should be withheld (e.g. commander not yet recognized).
    fn draft(&self, event: &DomainEvent) -> Option<Draft> {
        match &event.kind {
            DomainEventKind::AttackWaveImminent { eta } => Some(Draft {
                key: ReminderKey::bare(ReminderKind::AttackWave),
                message: format!("Attack wave incoming in {}s!", eta.as_secs()),
                ttl_override: Some(*eta),
            }),
            DomainEventKind::SupplyBlockCritical { used, cap } => Some(Draft {
                key: ReminderKey::bare(ReminderKind::SupplyBlock),
                message: format!("SUPPLY BLOCKED! {}/{}", used, cap),
                ttl_override: None,
            }),
            DomainEventKind::SupplyNearCap { used, cap } => Some(Draft {
                key: ReminderKey::bare(ReminderKind::SupplyWarning),
                message: format!("Supply warning: {}/{} - build more supply", used, cap),
                ttl_override: None,
            }),
            DomainEventKind::ResourceOverflow { resource, banked } => {
                let message = match resource {
                    Resource::Minerals => {
                        format!("High minerals: {} - expand or build army!", banked)
                    }
                    Resource::Gas => {
                        format!("High gas: {} - tech up or build advanced units!", banked)
                    }
                };
                Some(Draft {
                    key: ReminderKey::new(ReminderKind::ResourceOverflow, resource.display_name()),
                    message,
                    ttl_override: None,
                })
            }
            DomainEventKind::WorkerProductionStalled { workers } => Some(Draft {
                key: ReminderKey::bare(ReminderKind::WorkerProduction),
                message: format!("Build workers! Production stalled at {}", workers),
                ttl_override: None,
            }),
            DomainEventKind::UpgradeCompleted { slot } => {
                let discriminant = match slot {
                    UpgradeSlot::Attack => "attack",
                    UpgradeSlot::Armor => "armor",
                };
                Some(Draft {
                    key: ReminderKey::new(ReminderKind::UpgradeCompleted, discriminant),
                    message: format!(
                        "{} upgrade finished - queue the next level",
                        slot.display_name()
                    ),
                    ttl_override: None,
                })
            }
            DomainEventKind::ObjectiveTimerLow { remaining } => Some(Draft {
                key: ReminderKey::bare(ReminderKind::ObjectiveTimer),
                message: format!("Objective timer low: {}s remaining", remaining.as_secs()),
                ttl_override: None,
            }),
            DomainEventKind::GamePhaseChanged { phase } => self.commander_tip(*phase),
        }
    }

    /// Commander tips are withheld, not defaulted, while the commander is
    /// unknown or absent from the knowledge store.
    fn commander_tip(&self, phase: GamePhase) -> Option<Draft> {
        let name = self.commander.as_deref()?;
        let profile = self.commanders.get(name)?;
        let tip = profile.tip(phase)?;

        let mut message = format!("{}: {}", profile.name, tip);
        if phase == GamePhase::Early {
            if let Some(prestige) = profile.recommended_prestige() {
                message.push_str(&format!(
                    " (prestige: {} - {})",
                    prestige.name, prestige.summary
                ));
            }
        }
        Some(Draft {
            key: ReminderKey::new(ReminderKind::CommanderTip, phase.display_name()),
            message,
            ttl_override: None,
        })
    }

    fn admit(&mut self, draft: Draft, now: Duration) {
        let kind = draft.key.kind;
        if !self.config.is_enabled(kind) {
            debug!("reminder kind {:?} disabled, skipping", kind);
            return;
        }

        let ttl = draft.ttl_override.unwrap_or_else(|| self.config.ttl(kind));
        if let Some(existing) = self.active.get(&draft.key) {
            if self.is_material_change(existing, &draft, now, ttl) {
                info!("revising active reminder {:?}: {}", draft.key, draft.message);
                self.insert(draft, now, ttl);
            } else {
                debug!("suppressing duplicate reminder {:?}", draft.key);
            }
            return;
        }

        if let Some(&last) = self.last_delivered.get(&draft.key) {
            let cooldown = self.config.cooldown(kind);
            if now.saturating_sub(last) < cooldown {
                debug!("reminder {:?} suppressed by cooldown", draft.key);
                return;
            }
        }

        self.insert(draft, now, ttl);
    }

    /// An active attack-wave reminder is updated in place when the revised
    /// ETA moves beyond the configured tolerance; every other kind treats a
    /// repeat with the same key as a duplicate.
    fn is_material_change(
        &self,
        existing: &Reminder,
        draft: &Draft,
        now: Duration,
        ttl: Duration,
    ) -> bool {
        if draft.key.kind != ReminderKind::AttackWave {
            return false;
        }
        let revised_expiry = now + ttl;
        let tolerance = Duration::from_secs(self.config.eta_update_tolerance_secs);
        let shift = if revised_expiry > existing.expires_at {
            revised_expiry - existing.expires_at
        } else {
            existing.expires_at - revised_expiry
        };
        shift > tolerance
    }

    fn insert(&mut self, draft: Draft, now: Duration, ttl: Duration) {
        let reminder = Reminder {
            severity: draft.key.kind.severity(),
            key: draft.key.clone(),
            message: draft.message,
            created_at: now,
            display_after: now,
            expires_at: now + ttl,
            delivered: false,
        };
        self.active.insert(draft.key, reminder);
    }

    fn collect_due(&mut self, now: Duration) -> Vec<Reminder> {
        let mut due: Vec<Reminder> = Vec::new();
        for reminder in self.active.values_mut() {
            if !reminder.delivered && reminder.display_after <= now {
                reminder.delivered = true;
                due.push(reminder.clone());
            }
        }
        for reminder in &due {
            self.last_delivered.insert(reminder.key.clone(), now);
            self.history.push_back(reminder.clone());
            while self.history.len() > self.config.history_len.max(1) {
                self.history.pop_front();
            }
        }
        // Most severe first; ties broken by age then key for a stable order.
        due.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.key.discriminant.cmp(&b.key.discriminant))
        });
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commanders::{CommanderProfile, PhaseTips, PrestigeNote};
    use crate::core::model::DomainEventKind;

    fn at(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn event(secs: u64, kind: DomainEventKind) -> DomainEvent {
        DomainEvent { at: at(secs), kind }
    }

    fn scheduler() -> ReminderScheduler {
        ReminderScheduler::new(ReminderConfig::default(), CommanderStore::from_profiles(vec![]))
    }

    fn supply_warning(secs: u64) -> DomainEvent {
        event(secs, DomainEventKind::SupplyNearCap { used: 91, cap: 100 })
    }

    #[test]
    fn test_duplicate_events_yield_one_reminder() {
        let mut sched = scheduler();

        let delivered = sched.process(&[supply_warning(10)], at(10));
        assert_eq!(delivered.len(), 1);

        // Same key again within the cooldown window: suppressed.
        let delivered = sched.process(&[supply_warning(20)], at(20));
        assert!(delivered.is_empty());
    }

    #[test]
    fn test_cooldown_expires() {
        let mut sched = scheduler();

        assert_eq!(sched.process(&[supply_warning(0)], at(0)).len(), 1);
        // Past expiry (ttl 15) and cooldown (30): delivered again.
        let delivered = sched.process(&[supply_warning(40)], at(40));
        assert_eq!(delivered.len(), 1);
    }

    #[test]
    fn test_distinct_discriminants_do_not_collide() {
        let mut sched = scheduler();
        let events = [
            event(
                300,
                DomainEventKind::ResourceOverflow {
                    resource: Resource::Minerals,
                    banked: 1500,
                },
            ),
            event(
                300,
                DomainEventKind::ResourceOverflow {
                    resource: Resource::Gas,
                    banked: 1200,
                },
            ),
        ];
        let delivered = sched.process(&events, at(300));
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn test_revised_wave_eta_updates_instead_of_duplicating() {
        let mut sched = scheduler();

        let first = event(
            100,
            DomainEventKind::AttackWaveImminent {
                eta: Duration::from_secs(30),
            },
        );
        let delivered = sched.process(&[first], at(100));
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].message.contains("30s"));

        // ETA revised well beyond the tolerance while the first reminder is
        // still active: update and redeliver rather than duplicate.
        let revised = event(
            105,
            DomainEventKind::AttackWaveImminent {
                eta: Duration::from_secs(45),
            },
        );
        let delivered = sched.process(&[revised], at(105));
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].message.contains("45s"));

        // A re-emission with an ETA consistent with the active reminder is
        // a duplicate.
        let same = event(
            110,
            DomainEventKind::AttackWaveImminent {
                eta: Duration::from_secs(40),
            },
        );
        assert!(sched.process(&[same], at(110)).is_empty());
    }

    #[test]
    fn test_severity_ordering_of_concurrent_deliveries() {
        let mut sched = scheduler();
        let events = [
            event(
                200,
                DomainEventKind::ResourceOverflow {
                    resource: Resource::Minerals,
                    banked: 1800,
                },
            ),
            event(
                200,
                DomainEventKind::AttackWaveImminent {
                    eta: Duration::from_secs(25),
                },
            ),
            event(200, DomainEventKind::SupplyNearCap { used: 92, cap: 100 }),
        ];
        let delivered = sched.process(&events, at(200));
        assert_eq!(delivered.len(), 3);
        assert_eq!(delivered[0].key.kind, ReminderKind::AttackWave);
        assert!(delivered[1..]
            .iter()
            .all(|r| r.severity < delivered[0].severity));
    }

    #[test]
    fn test_commander_tip_withheld_until_identified() {
        let profile = CommanderProfile {
            name: "Raynor".to_string(),
            tips: PhaseTips {
                early: Some("Focus on orbital calldowns".to_string()),
                mid: None,
                late: None,
            },
            prestiges: vec![PrestigeNote {
                name: "Backwater Marshal".to_string(),
                summary: "Cheaper army".to_string(),
            }],
            power_spikes: vec![],
            synergy_notes: vec![],
        };
        let mut sched = ReminderScheduler::new(
            ReminderConfig::default(),
            CommanderStore::from_profiles(vec![profile]),
        );

        let phase_event = event(
            30,
            DomainEventKind::GamePhaseChanged {
                phase: GamePhase::Early,
            },
        );

        // Commander unknown: withheld, not generic.
        assert!(sched.process(&[phase_event.clone()], at(30)).is_empty());

        sched.set_commander("Raynor");
        let delivered = sched.process(&[phase_event], at(35));
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].message.contains("orbital calldowns"));
        assert!(delivered[0].message.contains("Backwater Marshal"));
        assert_eq!(delivered[0].severity, crate::core::alerts::model::Severity::Tip);
    }

    #[test]
    fn test_unknown_commander_in_store_is_withheld() {
        let mut sched = scheduler();
        sched.set_commander("Nova");
        let phase_event = event(
            30,
            DomainEventKind::GamePhaseChanged {
                phase: GamePhase::Early,
            },
        );
        assert!(sched.process(&[phase_event], at(30)).is_empty());
    }

    #[test]
    fn test_disabled_kind_is_skipped() {
        let mut config = ReminderConfig::default();
        if let Some(rule) = config.rules.get_mut(&ReminderKind::SupplyWarning) {
            rule.enabled = false;
        }
        let mut sched = ReminderScheduler::new(config, CommanderStore::from_profiles(vec![]));
        assert!(sched.process(&[supply_warning(0)], at(0)).is_empty());
    }

    #[test]
    fn test_expired_undelivered_is_dropped_silently() {
        let mut sched = scheduler();
        // Admit at t=0 but collect at t=100, past the 15s ttl: the reminder
        // was pruned before it could be delivered, and is not retried.
        let delivered = sched.process(&[supply_warning(0)], at(0));
        assert_eq!(delivered.len(), 1);

        sched.reset();
        // Recreate the stale-delivery shape directly: admit without
        // collecting by using an event whose ttl is already over at the
        // next process call.
        let wave = event(
            0,
            DomainEventKind::AttackWaveImminent {
                eta: Duration::from_secs(5),
            },
        );
        let delivered = sched.process(&[wave], at(0));
        assert_eq!(delivered.len(), 1);
        // After expiry nothing lingers: a later pass delivers nothing.
        assert!(sched.process(&[], at(100)).is_empty());
    }

    #[test]
    fn test_reset_clears_active_and_cooldowns() {
        let mut sched = scheduler();
        assert_eq!(sched.process(&[supply_warning(0)], at(0)).len(), 1);
        assert!(sched.process(&[supply_warning(5)], at(5)).is_empty());

        sched.reset();

        // Fresh session: the same event sequence delivers again.
        assert_eq!(sched.process(&[supply_warning(0)], at(0)).len(), 1);
        assert!(sched.history().count() == 1);
    }
}
