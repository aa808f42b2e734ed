//! Callback bridge between platform threads and session state.
//!
//! Everything here may run on a platform-owned thread. State changes happen
//! under `state`; caller-supplied sinks are only invoked after the lock is
//! released, so a sink may query the session without deadlocking.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use camcapture_ipc::{DeviceInfo, Format, RecordingState, SessionEvent, SessionPhase};
use camcapture_platform::{CapturedFrame, OutputHandle};

use crate::native::{NativeInput, RunGuard};
use crate::recording::RecordingMachine;
use crate::sink::{CompletionSink, EventHub, FrameSink};
use crate::stats::FrameStats;

/// Session state guarded by the bridge lock.
#[derive(Default)]
pub(crate) struct SessionState {
    pub phase: SessionPhase,
    pub device: Option<DeviceInfo>,
    pub input: Option<Arc<NativeInput>>,
    pub run: Option<RunGuard>,
    pub recording: RecordingMachine,
    pub frame_sink: Option<Arc<dyn FrameSink>>,
    pub completion_sink: Option<Arc<dyn CompletionSink>>,
}

impl SessionState {
    pub fn format(&self) -> Option<Format> {
        self.input.as_ref().map(|input| input.format())
    }
}

/// Per-session synchronization point for platform callbacks.
pub(crate) struct CallbackBridge {
    state: Mutex<SessionState>,
    finalized: Condvar,
    stats: FrameStats,
    events: EventHub,
}

impl CallbackBridge {
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            finalized: Condvar::new(),
            stats: FrameStats::new(),
            events: EventHub::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Block until the recording leaves `Finalizing` or `deadline` passes.
    ///
    /// Returns false on timeout.
    pub fn wait_finalized(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.recording.state() == RecordingState::Finalizing {
            if self.finalized.wait_until(&mut state, deadline).timed_out() {
                return state.recording.state() != RecordingState::Finalizing;
            }
        }
        true
    }

    /// Forward a frame to the registered sink.
    pub fn handle_frame(&self, frame: CapturedFrame) {
        if !frame.is_valid() {
            self.stats.record_malformed();
            warn!(
                sequence = frame.sequence,
                len = frame.data.len(),
                width = frame.width,
                height = frame.height,
                "Dropping malformed frame"
            );
            return;
        }

        let sink = {
            let state = self.state.lock();
            if state.phase != SessionPhase::Capturing {
                self.stats.record_inactive();
                return;
            }
            state.frame_sink.clone()
        };

        match sink {
            Some(sink) => {
                sink.on_frame(&frame);
                self.stats.record_delivered();
            }
            None => {
                self.stats.record_no_sink();
                trace!(
                    sequence = frame.sequence,
                    pts_ms = frame.timestamp.pts_ms(),
                    "No frame sink, dropping frame"
                );
            }
        }
    }

    /// Apply a platform output completion. Returns false if the output is not
    /// this session's active recording.
    pub fn handle_output_done(&self, output: OutputHandle, result: &Result<(), String>) -> bool {
        let (outcome, completion) = {
            let mut state = self.state.lock();
            let Some(outcome) = state.recording.finish(output, result.clone()) else {
                return false;
            };
            self.finalized.notify_all();
            (outcome, state.completion_sink.clone())
        };

        match &outcome.error {
            None => info!(path = %outcome.path.display(), "Recording finished"),
            Some(error) => warn!(path = %outcome.path.display(), %error, "Recording failed"),
        }

        self.events
            .emit(SessionEvent::RecordingFinished(outcome.clone()));
        if let Some(sink) = completion {
            sink.on_recording_finished(&outcome);
        }
        debug!(%output, "Output completion handled");
        true
    }
}
