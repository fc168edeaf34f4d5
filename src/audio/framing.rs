use crate::audio::resampler::StreamResampler;
use crate::Result;

/// Average interleaved channels down to mono
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Turns device callbacks of arbitrary size into fixed-size wire blocks
///
/// Input is interleaved at the device rate; output blocks are mono at the
/// target rate and exactly `block_size` long.
pub struct BlockFramer {
    channels: usize,
    block_size: usize,
    resampler: StreamResampler,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(device_rate: u32, channels: u16, target_rate: u32, block_size: usize) -> Result<Self> {
        Ok(Self {
            channels: channels.max(1) as usize,
            block_size: block_size.max(1),
            resampler: StreamResampler::new(device_rate, target_rate)?,
            pending: Vec::with_capacity(block_size * 2),
        })
    }

    /// Feed one device callback, returning every block completed by it
    pub fn push(&mut self, data: &[f32]) -> Result<Vec<Vec<f32>>> {
        let mono = downmix(data, self.channels);
        let resampled = self.resampler.process(&mono)?;
        self.pending.extend_from_slice(&resampled);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            blocks.push(std::mem::replace(&mut self.pending, rest));
        }
        Ok(blocks)
    }

    /// Samples waiting for the next block
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
