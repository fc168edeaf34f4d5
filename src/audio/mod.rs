pub mod buffer;
pub mod device;
pub mod framing;
#[cfg(feature = "audio-io")]
pub mod input;
pub mod mixer;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;

pub use buffer::OutputTap;
pub use device::{AudioBackend, CaptureFormat, CaptureStream, PlaybackEvent, PlaybackSink};
pub use framing::BlockFramer;
#[cfg(feature = "audio-io")]
pub use input::AudioInput;
pub use mixer::{Mixer, RateBridge};
#[cfg(feature = "audio-io")]
pub use output::AudioOutput;
pub use resampler::{resample_clip, StreamResampler};

/// Default system microphone and speakers through cpal
#[cfg(feature = "audio-io")]
#[derive(Debug, Clone, Copy)]
pub struct CpalBackend {
    /// Rate of the decoded clips handed to the speaker
    playback_rate: u32,
}

#[cfg(feature = "audio-io")]
impl CpalBackend {
    pub fn new(playback_rate: u32) -> Self {
        Self { playback_rate }
    }
}

#[cfg(feature = "audio-io")]
impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(crate::codec::WIRE_OUTPUT_SAMPLE_RATE)
    }
}

#[cfg(feature = "audio-io")]
impl AudioBackend for CpalBackend {
    fn open_input(
        &mut self,
        format: CaptureFormat,
        sender: crate::utils::CaptureSender,
    ) -> crate::Result<Box<dyn CaptureStream>> {
        Ok(Box::new(AudioInput::open(format, sender)?))
    }

    fn open_output(
        &mut self,
        notifier: crate::utils::PlaybackNotifier,
    ) -> crate::Result<Box<dyn PlaybackSink>> {
        Ok(Box::new(AudioOutput::open(notifier, self.playback_rate)?))
    }
}
