use crate::audio::device::{CaptureFormat, CaptureStream};
use crate::audio::framing::BlockFramer;
use crate::utils::CaptureSender;
use crate::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

/// Microphone stream on the default input device
pub struct AudioInput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    format: CaptureFormat,
    sender: CaptureSender,
    stream: Option<Stream>,
}

impl AudioInput {
    /// Acquire the default input device
    pub fn open(format: CaptureFormat, sender: CaptureSender) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| ParleyError::DeviceError("No input device available".into()))?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::DeviceError(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();

        Ok(Self {
            device,
            config: supported.into(),
            sample_format,
            format,
            sender,
            stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn build_stream<T>(&self, mut framer: BlockFramer) -> Result<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let block_tx = self.sender.clone();
        let fault_tx = self.sender.clone();
        let mut converted = Vec::new();

        let err_fn = move |err: cpal::StreamError| {
            error!("Audio input stream error: {}", err);
            fault_tx.report_fault(err.to_string());
        };

        self.device
            .build_input_stream(
                &self.config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    convert_samples(data, &mut converted);
                    match framer.push(&converted) {
                        Ok(blocks) => {
                            for block in blocks {
                                block_tx.send_block(block);
                            }
                        }
                        Err(e) => {
                            debug!("Dropping capture callback: {}", e);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ParleyError::DeviceError(format!("Failed to build input stream: {}", e)))
    }
}

/// Convert device samples to f32 in `out`, reusing its allocation
fn convert_samples<T>(data: &[T], out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    out.extend(data.iter().map(|&s| s.to_sample::<f32>()));
}

impl CaptureStream for AudioInput {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            warn!("Capture already running");
            return Ok(());
        }

        let framer = BlockFramer::new(
            self.sample_rate(),
            self.channels(),
            self.format.sample_rate,
            self.format.block_size,
        )?;

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(framer),
            SampleFormat::F64 => self.build_stream::<f64>(framer),
            SampleFormat::I16 => self.build_stream::<i16>(framer),
            SampleFormat::I32 => self.build_stream::<i32>(framer),
            SampleFormat::U16 => self.build_stream::<u16>(framer),
            SampleFormat::U8 => self.build_stream::<u8>(framer),
            other => Err(ParleyError::DeviceError(format!(
                "Unsupported input sample format: {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| ParleyError::DeviceError(format!("Failed to start input stream: {}", e)))?;

        self.stream = Some(stream);
        info!(
            "Started capture: {} Hz x{} {:?} -> {} Hz blocks of {}",
            self.sample_rate(),
            self.channels(),
            self.sample_format,
            self.format.sample_rate,
            self.format.block_size
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Stopped capture");
        }
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_audio_input_open() {
        // No input device in most CI environments
        let (tx, _rx) = bounded(16);
        let format = CaptureFormat {
            sample_rate: 16000,
            block_size: 4096,
        };
        if let Ok(input) = AudioInput::open(format, CaptureSender::new(tx, 1)) {
            assert!(input.sample_rate() > 0);
            assert!(input.channels() > 0);
            assert!(!input.is_running());
        }
    }

    #[test]
    fn test_integer_samples_are_normalized() {
        let mut out = vec![9.0; 3];
        convert_samples(&[0i16, i16::MIN, 16384], &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], -1.0);
        assert!((out[2] - 0.5).abs() < 1e-6);

        convert_samples(&[32768u16, 0], &mut out);
        assert_eq!(out, vec![0.0, -1.0]);

        convert_samples(&[0.25f32], &mut out);
        assert_eq!(out, vec![0.25]);
    }
}
