//! The single input queue feeding the session dispatch loop
//!
//! Device callbacks and the remote connection never touch session state.
//! They hold one of the typed senders below, which tag every input with the
//! generation of the session that created them so the dispatch loop can drop
//! stragglers from a torn-down session.

use crate::audio::device::PlaybackEvent;
use crate::live::ChannelEvent;
use crate::state::SessionCommand;
use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

/// Everything the dispatch loop consumes, in arrival order
#[derive(Debug)]
pub enum SessionInput {
    /// Request from the UI handle
    Command(SessionCommand),

    /// One fixed-size block of mono samples at the wire input rate
    Capture { generation: u64, block: Vec<f32> },

    /// The capture device reported a failure
    CaptureFault { generation: u64, message: String },

    /// Inbound event from the remote channel
    Channel { generation: u64, event: ChannelEvent },

    /// Notice from the output device
    Playback { generation: u64, event: PlaybackEvent },
}

/// Handed to a capture stream; called from the audio callback
#[derive(Clone)]
pub struct CaptureSender {
    tx: Sender<SessionInput>,
    generation: u64,
}

impl CaptureSender {
    pub fn new(tx: Sender<SessionInput>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Queue a block without blocking; returns false if it was dropped
    pub fn send_block(&self, block: Vec<f32>) -> bool {
        match self.tx.try_send(SessionInput::Capture {
            generation: self.generation,
            block,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Session input queue full, dropping capture block");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn report_fault(&self, message: impl Into<String>) {
        let _ = self.tx.try_send(SessionInput::CaptureFault {
            generation: self.generation,
            message: message.into(),
        });
    }
}

/// Handed to a remote channel; inbound events are never dropped
#[derive(Clone)]
pub struct ChannelEventSender {
    tx: Sender<SessionInput>,
    generation: u64,
}

impl ChannelEventSender {
    pub fn new(tx: Sender<SessionInput>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Blocks while the queue is full; returns false once the loop is gone
    pub fn send(&self, event: ChannelEvent) -> bool {
        if self
            .tx
            .send(SessionInput::Channel {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            warn!("Dispatch loop gone, dropping channel event");
            return false;
        }
        true
    }
}

/// Handed to a playback sink; called from the output callback
#[derive(Clone)]
pub struct PlaybackNotifier {
    tx: Sender<SessionInput>,
    generation: u64,
}

impl PlaybackNotifier {
    pub fn new(tx: Sender<SessionInput>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Try to deliver a notice; returns false if the caller should retry later
    pub fn try_notify(&self, event: PlaybackEvent) -> bool {
        match self.tx.try_send(SessionInput::Playback {
            generation: self.generation,
            event,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            // Nobody is listening anymore, nothing to retry
            Err(TrySendError::Disconnected(_)) => true,
        }
    }
}
