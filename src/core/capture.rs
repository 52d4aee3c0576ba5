//! Seams to the external collaborators: screen capture, recognition and
//! the reminder sink.
//!
//! The core never captures or renders anything itself; real
//! implementations live outside this crate and plug in through these
//! traits.

use std::io;
use std::time::Duration;

use super::alerts::model::Reminder;
use super::model::{FieldId, RawFrame};

/// One captured screen region, opaque to the core.
#[derive(Debug, Clone)]
pub struct RegionCapture {
    pub field: FieldId,
    /// Encoded image bytes; the recognition engine decides the format.
    pub image: Vec<u8>,
}

/// A timestamped set of captured regions.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture timestamp as a duration since the Unix epoch.
    pub captured_at: Duration,
    pub regions: Vec<RegionCapture>,
}

/// Produces frames at the sampling cadence. The pipeline pulls; the source
/// never drives the loop.
pub trait FrameSource: Send {
    /// The next frame, or None when no frame is available this tick
    /// (source idle or exhausted).
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Turns captured regions into raw per-field readings.
///
/// Implementations may block; the pipeline bounds each pass with a timeout
/// and treats an overrun as an all-unrecognized frame. Fields the engine
/// cannot read are simply left out of the result.
pub trait RecognitionEngine: Send {
    fn recognize(&mut self, frame: &Frame) -> RawFrame;
}

/// Receives reminders for rendering or notification. Delivery is
/// fire-and-forget from the pipeline's perspective: an error here never
/// stalls sampling.
pub trait ReminderSink: Send {
    fn deliver(&mut self, reminder: &Reminder) -> io::Result<()>;
}

#[cfg(test)]
pub mod test_support {
    //! Shared in-memory collaborators for pipeline and coordinator tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, PoisonError};

    use super::*;

    /// Frame source backed by a queue of prepared frames.
    pub struct QueuedFrames {
        frames: VecDeque<Frame>,
    }

    impl QueuedFrames {
        pub fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for QueuedFrames {
        fn next_frame(&mut self) -> Option<Frame> {
            self.frames.pop_front()
        }
    }

    /// Sink that records everything it is handed.
    #[derive(Clone, Default)]
    pub struct CollectingSink {
        pub delivered: Arc<Mutex<Vec<Reminder>>>,
    }

    impl ReminderSink for CollectingSink {
        fn deliver(&mut self, reminder: &Reminder) -> io::Result<()> {
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(reminder.clone());
            Ok(())
        }
    }

    /// Sink that fails every delivery, for degradation tests.
    pub struct UnavailableSink;

    impl ReminderSink for UnavailableSink {
        fn deliver(&mut self, _reminder: &Reminder) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink offline"))
        }
    }
}
