use crate::{ParleyError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

fn sinc_resampler(input_rate: u32, output_rate: u32) -> Result<SincFixedIn<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        CHUNK_FRAMES,
        1,
    )
    .map_err(|e| ParleyError::DeviceError(format!("Failed to create resampler: {}", e)))
}

fn check_rates(input_rate: u32, output_rate: u32) -> Result<()> {
    if input_rate == 0 || output_rate == 0 {
        return Err(ParleyError::ConfigError(
            "Sample rates must be greater than 0".into(),
        ));
    }
    Ok(())
}

/// Mono resampler for a continuous stream
///
/// Input arrives in arbitrary slice sizes. Frames that do not fill a whole
/// resampler chunk are held back until the next call, so no padding is ever
/// inserted mid-stream. Buffers are allocated once, which keeps
/// `process_into` usable from a device callback.
pub struct StreamResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    scratch: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        check_rates(input_rate, output_rate)?;

        let resampler = if input_rate == output_rate {
            None
        } else {
            debug!("Created stream resampler: {} Hz -> {} Hz", input_rate, output_rate);
            Some(sinc_resampler(input_rate, output_rate)?)
        };
        let scratch = resampler
            .as_ref()
            .map(|r| r.output_buffer_allocate(true))
            .unwrap_or_default();

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
            scratch,
        })
    }

    /// Feed samples, returning whatever output is ready
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mut output = Vec::new();
        self.process_into(input, &mut output)?;
        Ok(output)
    }

    /// Feed samples, appending whatever output is ready to `output`
    pub fn process_into(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            output.extend_from_slice(input);
            return Ok(());
        };

        self.pending.extend_from_slice(input);

        let mut consumed = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }
            let chunk = &self.pending[consumed..consumed + needed];
            let (_, written) = resampler
                .process_into_buffer(&[chunk], self.scratch.as_mut_slice(), None)
                .map_err(|e| ParleyError::DeviceError(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&self.scratch[0][..written]);
            consumed += needed;
        }
        self.pending.drain(..consumed);

        Ok(())
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample one self-contained mono clip
///
/// The result starts aligned with the input and has exactly
/// `ceil(len * output_rate / input_rate)` samples.
pub fn resample_clip(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    check_rates(input_rate, output_rate)?;
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = sinc_resampler(input_rate, output_rate)?;
    let ratio = output_rate as f64 / input_rate as f64;
    let expected = (input.len() as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(expected + CHUNK_FRAMES * 2);
    let mut offset = 0;

    // Zero padded past the end until the tail is out
    while output.len() < expected {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; needed];
        if offset < input.len() {
            let take = needed.min(input.len() - offset);
            chunk[..take].copy_from_slice(&input[offset..offset + take]);
        }
        offset += needed;

        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| ParleyError::DeviceError(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    output.truncate(expected);
    Ok(output)
}
