//! Scripted playback of a recorded recognition session.
//!
//! A script is a JSON file of per-frame recognition results with
//! human-written RFC 3339 timestamps. Playback drives the exact same
//! pipeline as live capture, which makes scripts the cheapest way to
//! validate thresholds against a real game.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

use super::capture::{Frame, FrameSource, RecognitionEngine};
use super::model::{FieldId, RawFrame, RawReading};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("could not read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bad frame timestamp {timestamp:?}: {source}")]
    BadTimestamp {
        timestamp: String,
        source: chrono::ParseError,
    },
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    frames: Vec<ScriptFrame>,
}

#[derive(Debug, Deserialize)]
struct ScriptFrame {
    /// RFC 3339 capture timestamp, e.g. "2026-08-06T12:00:00Z".
    at: String,
    #[serde(default)]
    fields: HashMap<FieldId, RawReading>,
}

fn parse_script(content: &str) -> Result<Vec<RawFrame>, ReplayError> {
    let script: ScriptFile = serde_json::from_str(content)?;
    let mut frames = Vec::with_capacity(script.frames.len());
    for frame in script.frames {
        let parsed =
            DateTime::parse_from_rfc3339(&frame.at).map_err(|source| ReplayError::BadTimestamp {
                timestamp: frame.at.clone(),
                source,
            })?;
        let captured_at = Duration::from_millis(parsed.timestamp_millis().max(0) as u64);
        frames.push(RawFrame {
            captured_at,
            fields: frame.fields,
        });
    }
    Ok(frames)
}

/// Load a script and split it into the two collaborator halves the
/// pipeline expects: a frame source and a recognition engine that replays
/// the recorded readings for each frame it is handed.
pub fn scripted_session(
    path: impl AsRef<Path>,
) -> Result<(ScriptedFrames, ScriptedRecognition), ReplayError> {
    let content = fs::read_to_string(path)?;
    scripted_session_from_str(&content)
}

pub fn scripted_session_from_str(
    content: &str,
) -> Result<(ScriptedFrames, ScriptedRecognition), ReplayError> {
    let frames = parse_script(content)?;
    let recorded = Arc::new(Mutex::new(HashMap::new()));
    Ok((
        ScriptedFrames {
            pending: frames.into(),
            recorded: Arc::clone(&recorded),
        },
        ScriptedRecognition { recorded },
    ))
}

/// Replays recorded frames in order, one per pull.
pub struct ScriptedFrames {
    pending: VecDeque<RawFrame>,
    recorded: Arc<Mutex<HashMap<Duration, RawFrame>>>,
}

impl ScriptedFrames {
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ScriptedFrames {
    fn next_frame(&mut self) -> Option<Frame> {
        let raw = self.pending.pop_front()?;
        let captured_at = raw.captured_at;
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(captured_at, raw);
        Some(Frame {
            captured_at,
            regions: Vec::new(),
        })
    }
}

/// "Recognizes" a frame by looking up the recorded readings for its
/// timestamp. A frame with no recording comes back unrecognized, the same
/// degradation a live engine timeout produces.
pub struct ScriptedRecognition {
    recorded: Arc<Mutex<HashMap<Duration, RawFrame>>>,
}

impl RecognitionEngine for ScriptedRecognition {
    fn recognize(&mut self, frame: &Frame) -> RawFrame {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&frame.captured_at)
            .unwrap_or_else(|| RawFrame::unrecognized(frame.captured_at))
    }
}
