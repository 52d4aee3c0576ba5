use std::collections::VecDeque;
use std::time::Duration;

use log::debug;

use super::model::{Field, Supply};

/// A confirmed quantity: the last accepted value and when it was accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed<T> {
    pub value: T,
    pub at: Duration,
}

/// The detector's running belief about the current match.
///
/// Values only change through [`accept`], which enforces each field's
/// confidence gate, so noise never regresses the model. Elapsed mission
/// time additionally never decreases within a session; a regressing reading
/// is rejected as a misparse.
#[derive(Debug, Clone, Default)]
pub struct GameStateModel {
    pub elapsed: Option<Confirmed<Duration>>,
    pub minerals: Option<Confirmed<u32>>,
    pub gas: Option<Confirmed<u32>>,
    pub supply: Option<Confirmed<Supply>>,
    pub workers: Option<Confirmed<u32>>,
    pub attack_upgrade: Option<Confirmed<f32>>,
    pub armor_upgrade: Option<Confirmed<f32>>,
    pub red_points: Option<Confirmed<u32>>,
    pub objective_timer: Option<Confirmed<Duration>>,
    pub commander: Option<Confirmed<String>>,
    /// Confirmed worker counts, newest last. Bounded by the detector's
    /// configured window length.
    pub worker_history: VecDeque<Confirmed<u32>>,
    /// Capture timestamps of confirmed attack waves this session.
    pub wave_times: Vec<Duration>,
    /// Rolling estimate of the inter-wave interval.
    pub wave_interval: Option<Duration>,
}

impl GameStateModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an elapsed-mission-time reading. Rejects regressions outright:
    /// a clock that appears to run backwards is a misread digit, not a new
    /// truth.
    pub fn accept_elapsed(&mut self, field: &Field<Duration>, threshold: f32, at: Duration) -> bool {
        let Some(reading) = field else { return false };
        if reading.confidence < threshold {
            return false;
        }
        if let Some(current) = &self.elapsed {
            if reading.value < current.value {
                debug!(
                    "rejecting stale mission time {:?} (confirmed {:?})",
                    reading.value, current.value
                );
                return false;
            }
        }
        self.elapsed = Some(Confirmed {
            value: reading.value,
            at,
        });
        true
    }

    pub fn push_worker_history(&mut self, value: u32, at: Duration, window: usize) {
        self.worker_history.push_back(Confirmed { value, at });
        while self.worker_history.len() > window.max(1) {
            self.worker_history.pop_front();
        }
    }
}

/// Accept a reading into a confirmed slot if it is valid and clears the
/// field's confidence gate. Returns true when the slot was updated.
pub fn accept<T: Clone>(
    slot: &mut Option<Confirmed<T>>,
    field: &Field<T>,
    threshold: f32,
    at: Duration,
) -> bool {
    match field {
        Some(reading) if reading.confidence >= threshold => {
            *slot = Some(Confirmed {
                value: reading.value.clone(),
                at,
            });
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Reading;

    #[test]
    fn test_accept_respects_threshold() {
        let mut slot: Option<Confirmed<u32>> = None;

        let low = Some(Reading::new(42, 0.4));
        assert!(!accept(&mut slot, &low, 0.6, Duration::from_secs(1)));
        assert!(slot.is_none());

        let high = Some(Reading::new(42, 0.9));
        assert!(accept(&mut slot, &high, 0.6, Duration::from_secs(2)));
        assert_eq!(slot.as_ref().unwrap().value, 42);

        // An invalid field never overwrites confirmed state.
        assert!(!accept(&mut slot, &None, 0.6, Duration::from_secs(3)));
        assert_eq!(slot.as_ref().unwrap().at, Duration::from_secs(2));
    }

    #[test]
    fn test_elapsed_time_is_monotonic() {
        let mut model = GameStateModel::new();

        let t1 = Some(Reading::new(Duration::from_secs(100), 0.9));
        assert!(model.accept_elapsed(&t1, 0.7, Duration::from_secs(1)));

        // A misread earlier time is rejected outright.
        let stale = Some(Reading::new(Duration::from_secs(40), 0.9));
        assert!(!model.accept_elapsed(&stale, 0.7, Duration::from_secs(2)));
        assert_eq!(model.elapsed.as_ref().unwrap().value, Duration::from_secs(100));

        // Equal time is allowed (paused clock).
        let same = Some(Reading::new(Duration::from_secs(100), 0.9));
        assert!(model.accept_elapsed(&same, 0.7, Duration::from_secs(3)));
    }

    #[test]
    fn test_worker_history_is_bounded() {
        let mut model = GameStateModel::new();
        for i in 0..10 {
            model.push_worker_history(i, Duration::from_secs(i as u64), 4);
        }
        assert_eq!(model.worker_history.len(), 4);
        assert_eq!(model.worker_history.front().unwrap().value, 6);
    }
}
