use crate::audio::device::{PlaybackEvent, PlaybackSink};
use crate::audio::mixer::{Mixer, RateBridge};
use crate::audio::resampler::resample_clip;
use crate::messages::AudioData;
use crate::utils::PlaybackNotifier;
use crate::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Samples kept for the activity monitor
const TAP_WINDOW: usize = 256;

/// Wire frames mixed per pull from the callback
const RENDER_QUANTUM: usize = 256;

/// Speaker output on the default device
///
/// Clips are mixed at the wire rate; one stream resampler in the callback
/// converts the mix to whatever rate the device runs at.
pub struct AudioOutput {
    stream: Option<Stream>,
    mixer: Arc<Mutex<Mixer>>,
    wire_rate: u32,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Acquire the default output device and start rendering silence
    pub fn open(notifier: PlaybackNotifier, wire_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| ParleyError::DeviceError("No output device available".into()))?;

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| ParleyError::DeviceError(format!("Failed to get output config: {}", e)))?
            .into();

        let sample_rate = config.sample_rate.0;
        let channels = config.channels;
        let mixer = Arc::new(Mutex::new(Mixer::new(wire_rate, TAP_WINDOW)));
        let render_mixer = Arc::clone(&mixer);
        let mut bridge = RateBridge::new(wire_rate, sample_rate, RENDER_QUANTUM)?;
        if !bridge.is_passthrough() {
            debug!("Resampling output {} Hz -> {} Hz", wire_rate, sample_rate);
        }

        let err_fn = |err: cpal::StreamError| {
            error!("Audio output stream error: {}", err);
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let filled = bridge.fill(data, channels as usize, |quantum| {
                        let mut mixer = render_mixer.lock();
                        mixer.render(quantum);
                        mixer.drain_finished(|id| notifier.try_notify(PlaybackEvent::Ended(id)));
                    });
                    if let Err(e) = filled {
                        error!("Output render failed: {}", e);
                        data.fill(0.0);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ParleyError::DeviceError(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| ParleyError::DeviceError(format!("Failed to start output stream: {}", e)))?;

        info!(
            "Started playback sink at {} Hz x{} (mixing at {} Hz)",
            sample_rate, channels, wire_rate
        );

        Ok(Self {
            stream: Some(stream),
            mixer,
            wire_rate,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl PlaybackSink for AudioOutput {
    fn current_time(&self) -> f64 {
        self.mixer.lock().current_time()
    }

    fn schedule(&mut self, id: u64, audio: AudioData, start_at: f64) -> Result<()> {
        if self.stream.is_none() {
            return Err(ParleyError::DeviceError("Playback sink is closed".into()));
        }

        let samples = if audio.sample_rate == self.wire_rate {
            audio.samples
        } else {
            resample_clip(&audio.samples, audio.sample_rate, self.wire_rate)?
        };
        let mut mixer = self.mixer.lock();
        debug!(
            "Scheduling item {} ({} samples) at {:.3}s, {} queued",
            id,
            samples.len(),
            start_at,
            mixer.active_len()
        );
        mixer.add(id, samples, start_at);
        Ok(())
    }

    fn stop(&mut self, id: u64) {
        self.mixer.lock().remove(id);
    }

    fn output_rms(&self) -> f32 {
        self.mixer.lock().output_rms()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.mixer.lock().clear();
            info!("Stopped playback sink");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_audio_output_open() {
        // No output device in most CI environments
        let (tx, _rx) = bounded(16);
        if let Ok(mut output) = AudioOutput::open(PlaybackNotifier::new(tx, 1), 24000) {
            assert!(output.sample_rate() > 0);
            assert!(output.channels() > 0);
            assert!(output.current_time() >= 0.0);
            output.close();
            let audio = AudioData::mono(vec![0.0; 10], 24000);
            assert!(output.schedule(1, audio, 0.0).is_err());
        }
    }
}
