//! The sampling loop: capture at a fixed cadence, recognize with a bounded
//! timeout, feed the coordinator, deliver to the sink.
//!
//! Capture and recognition are decoupled by a depth-one, newest-wins slot:
//! if recognition falls behind, the latest frame silently replaces any
//! older unprocessed one. Stale work is dropped, backlog never builds.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::alerts::model::Reminder;
use super::capture::{Frame, FrameSource, RecognitionEngine, ReminderSink};
use super::coordinator::Coordinator;
use super::model::RawFrame;

/// External control of a running pipeline. Session reset is the only
/// permitted cancellation besides shutdown.
#[derive(Debug)]
pub enum PipelineCommand {
    Reset,
}

/// Bounded, drop-oldest buffer between the scheduler and the sink, so an
/// unavailable sink never blocks the sampling loop.
pub struct DeliveryQueue {
    queue: VecDeque<Reminder>,
    capacity: usize,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, reminder: Reminder) {
        if self.queue.len() == self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                warn!("delivery queue full, dropping oldest reminder {:?}", dropped.key);
            }
        }
        self.queue.push_back(reminder);
    }

    /// Hand queued reminders to the sink in order. Stops at the first
    /// failure and keeps the rest for the next attempt.
    pub fn flush(&mut self, sink: &mut impl ReminderSink) {
        while let Some(reminder) = self.queue.pop_front() {
            if let Err(e) = sink.deliver(&reminder) {
                debug!("sink unavailable ({}), holding {} reminder(s)", e, self.queue.len() + 1);
                self.queue.push_front(reminder);
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// One recognition pass, bounded by `timeout`. The engine runs on the
/// blocking pool; an overrun degrades to an all-unrecognized frame and the
/// straggling pass finishes in the background, naturally serialized behind
/// the engine lock.
pub async fn recognize_with_timeout<R>(
    engine: &Arc<Mutex<R>>,
    frame: Frame,
    timeout: Duration,
) -> RawFrame
where
    R: RecognitionEngine + 'static,
{
    let captured_at = frame.captured_at;
    let engine = Arc::clone(engine);
    let pass = tokio::task::spawn_blocking(move || {
        let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
        guard.recognize(&frame)
    });

    match tokio::time::timeout(timeout, pass).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(join_error)) => {
            warn!("recognition pass failed: {}", join_error);
            RawFrame::unrecognized(captured_at)
        }
        Err(_) => {
            warn!(
                "recognition timed out after {:?}, treating frame as unrecognized",
                timeout
            );
            RawFrame::unrecognized(captured_at)
        }
    }
}

/// Drive the full pipeline until cancelled.
///
/// `sampling_interval` paces the capture task; `recognition_timeout` bounds
/// each recognition pass; `queue_capacity` bounds the sink delivery queue.
pub async fn run_pipeline<S, R, K>(
    mut coordinator: Coordinator,
    mut source: S,
    engine: R,
    mut sink: K,
    mut commands: mpsc::Receiver<PipelineCommand>,
    cancel: CancellationToken,
    sampling_interval: Duration,
    recognition_timeout: Duration,
    queue_capacity: usize,
) where
    S: FrameSource + 'static,
    R: RecognitionEngine + 'static,
    K: ReminderSink,
{
    let engine = Arc::new(Mutex::new(engine));
    let (frame_tx, mut frame_rx) = watch::channel::<Option<Frame>>(None);

    // Capture runs independently so a slow recognition pass never stalls
    // it; the watch channel keeps only the newest frame.
    let capture_cancel = cancel.clone();
    let capture = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sampling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(frame) = source.next_frame() {
                        if frame_tx.send(Some(frame)).is_err() {
                            break;
                        }
                    }
                }
                _ = capture_cancel.cancelled() => break,
            }
        }
    });

    let mut delivery = DeliveryQueue::new(queue_capacity);
    let mut commands_open = true;
    loop {
        tokio::select! {
            changed = frame_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frame_rx.borrow_and_update().clone();
                let Some(frame) = frame else { continue };
                let raw = recognize_with_timeout(&engine, frame, recognition_timeout).await;
                for reminder in coordinator.ingest(&raw) {
                    delivery.push(reminder);
                }
                delivery.flush(&mut sink);
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(PipelineCommand::Reset) => {
                        coordinator.reset();
                        delivery.clear();
                    }
                    None => commands_open = false,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    let _ = capture.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{Reminder, ReminderKey, ReminderKind, Severity};
    use crate::core::capture::test_support::{CollectingSink, QueuedFrames, UnavailableSink};
    use crate::core::commanders::CommanderStore;
    use crate::core::config::Settings;
    use crate::core::model::{FieldId, RawReading};
    use crate::core::replay::scripted_session_from_str;

    fn reminder(n: u64) -> Reminder {
        Reminder {
            key: ReminderKey::new(ReminderKind::SupplyWarning, n.to_string()),
            severity: Severity::Macro,
            message: format!("reminder {}", n),
            created_at: Duration::from_secs(n),
            display_after: Duration::from_secs(n),
            expires_at: Duration::from_secs(n + 15),
            delivered: false,
        }
    }

    #[test]
    fn test_delivery_queue_drops_oldest_when_full() {
        let mut queue = DeliveryQueue::new(2);
        queue.push(reminder(1));
        queue.push(reminder(2));
        queue.push(reminder(3));

        assert_eq!(queue.len(), 2);
        let mut sink = CollectingSink::default();
        queue.flush(&mut sink);

        let delivered = sink.delivered.lock().unwrap();
        let messages: Vec<_> = delivered.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["reminder 2", "reminder 3"]);
    }

    #[test]
    fn test_delivery_queue_holds_reminders_while_sink_is_down() {
        let mut queue = DeliveryQueue::new(4);
        queue.push(reminder(1));
        queue.flush(&mut UnavailableSink);
        assert_eq!(queue.len(), 1, "undelivered reminder is retained");

        let mut sink = CollectingSink::default();
        queue.flush(&mut sink);
        assert!(queue.is_empty());
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    struct SlowEngine;

    impl crate::core::capture::RecognitionEngine for SlowEngine {
        fn recognize(&mut self, frame: &Frame) -> RawFrame {
            std::thread::sleep(Duration::from_millis(250));
            RawFrame::unrecognized(frame.captured_at)
        }
    }

    #[tokio::test]
    async fn test_recognition_timeout_degrades_to_unrecognized() {
        let engine = Arc::new(Mutex::new(SlowEngine));
        let frame = Frame {
            captured_at: Duration::from_secs(42),
            regions: Vec::new(),
        };
        let raw = recognize_with_timeout(&engine, frame, Duration::from_millis(20)).await;
        assert_eq!(raw, RawFrame::unrecognized(Duration::from_secs(42)));
    }

    #[tokio::test]
    async fn test_pipeline_delivers_from_scripted_session() {
        let script = r#"{
            "frames": [
                { "at": "2026-08-06T12:00:00Z",
                  "fields": { "Supply": { "text": "70/100", "confidence": 0.95 } } },
                { "at": "2026-08-06T12:00:01Z",
                  "fields": { "Supply": { "text": "92/100", "confidence": 0.95 } } }
            ]
        }"#;
        let (source, engine) = scripted_session_from_str(script).unwrap();
        let settings = Settings::default();
        let coordinator =
            Coordinator::new(&settings, CommanderStore::from_profiles(vec![]));
        let sink = CollectingSink::default();
        let delivered = Arc::clone(&sink.delivered);

        let (_command_tx, command_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let pipeline = tokio::spawn(run_pipeline(
            coordinator,
            source,
            engine,
            sink,
            command_rx,
            cancel,
            Duration::from_millis(10),
            Duration::from_millis(100),
            8,
        ));

        // Give the loop time to play both frames through, then stop it.
        tokio::time::sleep(Duration::from_millis(300)).await;
        stop.cancel();
        pipeline.await.unwrap();

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].message.contains("92/100"));
    }

    #[tokio::test]
    async fn test_reset_command_clears_session_state() {
        let frames = vec![Frame {
            captured_at: Duration::from_secs(1),
            regions: Vec::new(),
        }];

        struct WarningEngine;
        impl crate::core::capture::RecognitionEngine for WarningEngine {
            fn recognize(&mut self, frame: &Frame) -> RawFrame {
                let mut raw = RawFrame::unrecognized(frame.captured_at);
                raw.fields
                    .insert(FieldId::Supply, RawReading::new("95/100", 0.95));
                raw
            }
        }

        let settings = Settings::default();
        let coordinator =
            Coordinator::new(&settings, CommanderStore::from_profiles(vec![]));
        let sink = CollectingSink::default();
        let delivered = Arc::clone(&sink.delivered);

        let (command_tx, command_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let pipeline = tokio::spawn(run_pipeline(
            coordinator,
            QueuedFrames::new(frames),
            WarningEngine,
            sink,
            command_rx,
            cancel,
            Duration::from_millis(10),
            Duration::from_millis(100),
            8,
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        command_tx.send(PipelineCommand::Reset).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        pipeline.await.unwrap();

        // The single frame produced its delivery before the reset; the
        // reset itself must not panic or redeliver anything.
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
    }
}
