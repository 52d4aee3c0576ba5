//! Sequential heart of the pipeline: raw frame in, deliverable reminders
//! out.
//!
//! One coordinator owns one session's detector and scheduler. Frames must
//! be fed in capture order; anything not newer than the last processed
//! frame is rejected so a delayed recognition pass can never rewind the
//! model.

use std::time::Duration;

use log::{debug, info};

use super::alerts::model::Reminder;
use super::alerts::scheduler::ReminderScheduler;
use super::commanders::CommanderStore;
use super::config::Settings;
use super::detector::EventDetector;
use super::model::RawFrame;
use super::normalizer::StateNormalizer;
use super::state::GameStateModel;

pub struct Coordinator {
    normalizer: StateNormalizer,
    detector: EventDetector,
    scheduler: ReminderScheduler,
    last_processed: Option<Duration>,
}

impl Coordinator {
    pub fn new(settings: &Settings, commanders: CommanderStore) -> Self {
        Self {
            normalizer: StateNormalizer::new(settings.limits.clone()),
            detector: EventDetector::new(
                settings.detection.clone(),
                settings.acceptance.clone(),
            ),
            scheduler: ReminderScheduler::new(settings.reminders.clone(), commanders),
            last_processed: None,
        }
    }

    pub fn model(&self) -> &GameStateModel {
        self.detector.model()
    }

    /// Process one frame's recognition output and return the reminders due
    /// for delivery, most severe first.
    pub fn ingest(&mut self, raw: &RawFrame) -> Vec<Reminder> {
        if let Some(last) = self.last_processed {
            if raw.captured_at <= last {
                debug!(
                    "dropping out-of-order frame at {:?} (last processed {:?})",
                    raw.captured_at, last
                );
                return Vec::new();
            }
        }
        self.last_processed = Some(raw.captured_at);

        let observation = self.normalizer.normalize(raw);
        let events = self.detector.observe(&observation);
        if !events.is_empty() {
            debug!("detected {} event(s) at {:?}", events.len(), raw.captured_at);
        }
        if let Some(name) = self.detector.commander() {
            let name = name.to_string();
            self.scheduler.set_commander(&name);
        }
        self.scheduler.process(&events, raw.captured_at)
    }

    /// Start a fresh session: atomically discard the game-state model and
    /// every active reminder. The only permitted external cancellation.
    pub fn reset(&mut self) {
        info!("session reset");
        self.detector.reset();
        self.scheduler.reset();
        self.last_processed = None;
    }
}
