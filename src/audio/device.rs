//! Audio device contract consumed by the session
//!
//! Streams are created on the dispatch thread and never leave it, so the
//! stream traits carry no `Send` bound (cpal streams are not `Send` on every
//! host).

use crate::messages::AudioData;
use crate::utils::{CaptureSender, PlaybackNotifier};
use crate::Result;

/// Notice raised by a playback sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The item with this id played to the end
    Ended(u64),
}

/// Capture format requested from the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    /// Rate of the blocks handed to the session
    pub sample_rate: u32,
    /// Samples per block
    pub block_size: usize,
}

/// A live microphone stream
///
/// Once started it delivers fixed-size mono blocks at the requested rate
/// through the `CaptureSender` it was opened with.
pub trait CaptureStream {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Output device with a monotonic clock and per-item scheduling
pub trait PlaybackSink {
    /// Seconds of audio rendered since the sink was opened
    fn current_time(&self) -> f64;

    /// Queue `audio` to begin at `start_at` on the sink clock
    ///
    /// The sink reports `PlaybackEvent::Ended(id)` when the item finishes
    /// naturally. Stopped items are not reported.
    fn schedule(&mut self, id: u64, audio: AudioData, start_at: f64) -> Result<()>;

    fn stop(&mut self, id: u64);

    /// RMS of the most recent output window
    fn output_rms(&self) -> f32;

    fn close(&mut self);
}

/// Factory for device streams
pub trait AudioBackend: Send {
    fn open_input(
        &mut self,
        format: CaptureFormat,
        sender: CaptureSender,
    ) -> Result<Box<dyn CaptureStream>>;

    fn open_output(&mut self, notifier: PlaybackNotifier) -> Result<Box<dyn PlaybackSink>>;
}
