//! Normalizes raw per-frame recognition output into typed observations.
//!
//! Pure transformation: it never fails and has no side effects. Anything
//! that cannot be parsed or is not plausible comes out as an invalid field
//! rather than an error.

use std::time::Duration;

use regex::Regex;

use super::config::PlausibilityLimits;
use super::model::{
    Field, FieldId, Observation, RawFrame, RawReading, Reading, Supply,
};

pub struct StateNormalizer {
    limits: PlausibilityLimits,
    int_regex: Regex,
    supply_regex: Regex,
    clock_regex: Regex,
    percent_regex: Regex,
}

impl StateNormalizer {
    pub fn new(limits: PlausibilityLimits) -> Self {
        // OCR output is noisy: numbers arrive with stray punctuation and
        // whitespace, so every pattern scans for its shape inside the text.
        let int_regex = Regex::new(r"\d+").expect("invalid integer regex");
        let supply_regex = Regex::new(r"(\d+)\s*/\s*(\d+)").expect("invalid supply regex");
        let clock_regex = Regex::new(r"(\d{1,3}):(\d{2})").expect("invalid clock regex");
        let percent_regex = Regex::new(r"(\d{1,3})\s*%").expect("invalid percent regex");

        Self {
            limits,
            int_regex,
            supply_regex,
            clock_regex,
            percent_regex,
        }
    }

    /// Turn one frame's raw recognition output into an observation.
    /// Best-effort per field; malformed input never raises.
    pub fn normalize(&self, raw: &RawFrame) -> Observation {
        Observation {
            captured_at: raw.captured_at,
            minerals: self.count_field(raw, FieldId::Minerals, self.limits.max_resource_bank),
            gas: self.count_field(raw, FieldId::Gas, self.limits.max_resource_bank),
            supply: self.supply_field(raw),
            workers: self.count_field(raw, FieldId::Workers, self.limits.max_workers),
            game_time: self.clock_field(
                raw,
                FieldId::GameTime,
                Duration::from_secs(self.limits.max_mission_secs),
            ),
            attack_upgrade: self.ratio_field(raw, FieldId::AttackUpgrade),
            armor_upgrade: self.ratio_field(raw, FieldId::ArmorUpgrade),
            red_points: self.count_field(raw, FieldId::RedPoints, self.limits.max_red_points),
            objective_timer: self.clock_field(
                raw,
                FieldId::ObjectiveTimer,
                Duration::from_secs(self.limits.max_objective_secs),
            ),
            commander: self.commander_field(raw),
        }
    }

    fn reading<'a>(&self, raw: &'a RawFrame, field: FieldId) -> Option<(&'a RawReading, f32)> {
        let reading = raw.fields.get(&field)?;
        Some((reading, reading.confidence.clamp(0.0, 1.0)))
    }

    /// Parse the first integer in the text, e.g. "1.234" OCR'd from "1234".
    fn count_field(&self, raw: &RawFrame, field: FieldId, max: u32) -> Field<u32> {
        let (reading, confidence) = self.reading(raw, field)?;
        let value: u32 = self.int_regex.find(&reading.text)?.as_str().parse().ok()?;
        if value > max {
            return None;
        }
        Some(Reading::new(value, confidence))
    }

    /// Supply is shown as "used/cap". Used beyond cap or either side beyond
    /// the hard cap cannot be real.
    fn supply_field(&self, raw: &RawFrame) -> Field<Supply> {
        let (reading, confidence) = self.reading(raw, FieldId::Supply)?;
        let caps = self.supply_regex.captures(&reading.text)?;
        let used: u32 = caps.get(1)?.as_str().parse().ok()?;
        let cap: u32 = caps.get(2)?.as_str().parse().ok()?;
        if cap == 0 || cap > self.limits.supply_hard_cap || used > cap {
            return None;
        }
        Some(Reading::new(Supply { used, cap }, confidence))
    }

    /// "MM:SS" clocks, both the mission timer and objective countdowns.
    fn clock_field(&self, raw: &RawFrame, field: FieldId, max: Duration) -> Field<Duration> {
        let (reading, confidence) = self.reading(raw, field)?;
        let caps = self.clock_regex.captures(&reading.text)?;
        let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
        let seconds: u64 = caps.get(2)?.as_str().parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        let value = Duration::from_secs(minutes * 60 + seconds);
        if value > max {
            return None;
        }
        Some(Reading::new(value, confidence))
    }

    /// Upgrade completion as "NN%"; a bare ratio like "0.4" also parses.
    fn ratio_field(&self, raw: &RawFrame, field: FieldId) -> Field<f32> {
        let (reading, confidence) = self.reading(raw, field)?;
        let value = if let Some(caps) = self.percent_regex.captures(&reading.text) {
            let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
            percent / 100.0
        } else {
            reading.text.trim().parse::<f32>().ok()?
        };
        if !(0.0..=1.0).contains(&value) {
            return None;
        }
        Some(Reading::new(value, confidence))
    }

    /// Commander names are free text; require something that looks like a
    /// name rather than OCR noise.
    fn commander_field(&self, raw: &RawFrame) -> Field<String> {
        let (reading, confidence) = self.reading(raw, FieldId::Commander)?;
        let name = reading.text.trim();
        if name.len() < 2 || !name.chars().any(|c| c.is_alphabetic()) {
            return None;
        }
        Some(Reading::new(name.to_string(), confidence))
    }
}

impl Default for StateNormalizer {
    fn default() -> Self {
        Self::new(PlausibilityLimits::default())
    }
}
