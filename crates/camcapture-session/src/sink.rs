//! Consumers of frames, recording outcomes, and session events.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, trace};

use camcapture_ipc::{RecordingOutcome, SessionEvent};
use camcapture_platform::CapturedFrame;

/// Channel capacity for frames handed to a [`ChannelFrameSink`].
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Receives every frame captured while the session is capturing.
///
/// Called on the platform's delivery thread, without any session lock held.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &CapturedFrame);
}

impl<F> FrameSink for F
where
    F: Fn(&CapturedFrame) + Send + Sync,
{
    fn on_frame(&self, frame: &CapturedFrame) {
        self(frame)
    }
}

/// Receives the terminal outcome of each recording.
pub trait CompletionSink: Send + Sync {
    fn on_recording_finished(&self, outcome: &RecordingOutcome);
}

impl<F> CompletionSink for F
where
    F: Fn(&RecordingOutcome) + Send + Sync,
{
    fn on_recording_finished(&self, outcome: &RecordingOutcome) {
        self(outcome)
    }
}

/// Frame sink that forwards into a bounded channel, dropping frames when
/// the consumer falls behind.
pub struct ChannelFrameSink {
    sender: Sender<CapturedFrame>,
}

impl FrameSink for ChannelFrameSink {
    fn on_frame(&self, frame: &CapturedFrame) {
        match self.sender.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Frame channel full, dropping frame #{}", frame.sequence);
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Frame receiver gone, dropping frame #{}", frame.sequence);
            }
        }
    }
}

/// Creates a bounded frame channel and the sink that feeds it.
pub fn frame_channel(capacity: usize) -> (ChannelFrameSink, Receiver<CapturedFrame>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (ChannelFrameSink { sender }, receiver)
}

/// Fan-out of session events to subscribers.
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, capacity: usize) -> Receiver<SessionEvent> {
        let (sender, receiver) = camcapture_ipc::event_channel(capacity);
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Send to every live subscriber; never blocks.
    pub fn emit(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .retain(|sender| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(?event, "Event channel full, dropping event");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use camcapture_ipc::SessionPhase;
    use camcapture_platform::{CaptureTimestamp, PixelFormat};
    use std::time::Instant;

    fn frame(sequence: u64) -> CapturedFrame {
        CapturedFrame::new(
            Bytes::from(vec![0u8; 6]),
            2,
            2,
            PixelFormat::Nv12,
            CaptureTimestamp::now(Instant::now()),
            sequence,
        )
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (sink, receiver) = frame_channel(2);
        for sequence in 0..4 {
            sink.on_frame(&frame(sequence));
        }

        let received: Vec<u64> = receiver.try_iter().map(|f| f.sequence).collect();
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn test_event_hub_prunes_disconnected() {
        let hub = EventHub::new();
        let kept = hub.subscribe(4);
        drop(hub.subscribe(4));

        hub.emit(SessionEvent::PhaseChanged {
            previous: SessionPhase::Unconfigured,
            current: SessionPhase::Configured,
        });

        assert_eq!(hub.subscribers.lock().len(), 1);
        assert!(matches!(
            kept.try_recv(),
            Ok(SessionEvent::PhaseChanged { .. })
        ));
    }
}
