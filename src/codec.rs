//! Wire audio codec
//!
//! The remote service speaks 16-bit little-endian mono PCM: captured blocks go
//! out at the input rate, synthesized speech comes back at the output rate.

use crate::messages::AudioData;
use crate::{ParleyError, Result};

/// Sample rate of outbound microphone frames
pub const WIRE_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of inbound synthesized speech
pub const WIRE_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Encoded audio ready for the remote channel
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

impl WireFrame {
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Converts between device samples and wire payloads
pub trait AudioCodec: Send + Sync {
    fn encode(&self, samples: &[f32]) -> Result<WireFrame>;

    fn decode(&self, payload: &[u8]) -> Result<AudioData>;
}

/// Linear PCM16 codec
#[derive(Debug, Clone, Copy)]
pub struct Pcm16Codec {
    input_rate: u32,
    output_rate: u32,
}

impl Pcm16Codec {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
        }
    }
}

impl Default for Pcm16Codec {
    fn default() -> Self {
        Self::new(WIRE_INPUT_SAMPLE_RATE, WIRE_OUTPUT_SAMPLE_RATE)
    }
}

impl AudioCodec for Pcm16Codec {
    fn encode(&self, samples: &[f32]) -> Result<WireFrame> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            if !sample.is_finite() {
                return Err(ParleyError::EncodeDecodeError(format!(
                    "non-finite sample {}",
                    sample
                )));
            }
            let scaled = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            data.extend_from_slice(&scaled.to_le_bytes());
        }

        Ok(WireFrame {
            data,
            sample_rate: self.input_rate,
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<AudioData> {
        if payload.len() % 2 != 0 {
            return Err(ParleyError::EncodeDecodeError(format!(
                "PCM16 payload has odd length {}",
                payload.len()
            )));
        }

        let samples = payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        Ok(AudioData::mono(samples, self.output_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let codec = Pcm16Codec::default();
        let frame = codec.encode(&[0.0, 0.5, -1.0, 1.0]).unwrap();

        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(&frame.data[0..2], &0i16.to_le_bytes());
        assert_eq!(&frame.data[2..4], &16384i16.to_le_bytes());
        assert_eq!(&frame.data[4..6], &i16::MIN.to_le_bytes());
        // +1.0 saturates instead of wrapping
        assert_eq!(&frame.data[6..8], &i16::MAX.to_le_bytes());
    }

    #[test]
    fn test_silence_encodes_to_zero_bytes() {
        let codec = Pcm16Codec::default();
        let frame = codec.encode(&[0.0; 64]).unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_rejects_nan() {
        let codec = Pcm16Codec::default();
        assert!(codec.encode(&[0.1, f32::NAN]).is_err());
    }

    #[test]
    fn test_decode_uses_output_rate() {
        let codec = Pcm16Codec::default();
        let payload: Vec<u8> = [16384i16, -16384].iter().flat_map(|s| s.to_le_bytes()).collect();
        let audio = codec.decode(&payload).unwrap();

        assert_eq!(audio.sample_rate, 24000);
        assert_eq!(audio.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let codec = Pcm16Codec::default();
        let err = codec.decode(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, ParleyError::EncodeDecodeError(_)));
    }
}
