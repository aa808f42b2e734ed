//! Typed data model and session events for camcapture.
//!
//! This crate defines the value types shared between the platform layer,
//! the session manager, and whatever sits on top of them (bindings, demos).

mod events;
mod state;
mod types;

pub use events::SessionEvent;
pub use state::{RecordingOutcome, RecordingState, SessionPhase};
pub use types::{Device, DeviceId, DeviceInfo, Format};

use crossbeam_channel::{Receiver, Sender};

/// Default channel capacity for session events (Session → caller).
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Creates a bounded event channel.
pub fn event_channel(capacity: usize) -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(capacity)
}
