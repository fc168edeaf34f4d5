//! Capture side of the session: gate, encode, count faults

use crate::codec::{AudioCodec, WireFrame};
use crate::session::gate::{CapturedFrame, GateDecision, NoiseGate};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns raw capture blocks into outbound wire frames
pub struct CapturePipeline {
    gate: NoiseGate,
    codec: Arc<dyn AudioCodec>,
    max_device_faults: u32,
    consecutive_faults: u32,
    frames_passed: u64,
    frames_silenced: u64,
}

impl CapturePipeline {
    pub fn new(gate: NoiseGate, codec: Arc<dyn AudioCodec>, max_device_faults: u32) -> Self {
        Self {
            gate,
            codec,
            max_device_faults: max_device_faults.max(1),
            consecutive_faults: 0,
            frames_passed: 0,
            frames_silenced: 0,
        }
    }

    pub fn gate(&self) -> &NoiseGate {
        &self.gate
    }

    /// Takes effect from the next block
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.gate.set_sensitivity(sensitivity);
    }

    /// Meter and gate a block without encoding it
    pub fn meter(&self, block: Vec<f32>) -> CapturedFrame {
        self.gate.apply(block)
    }

    /// Gate and encode one block
    ///
    /// Returns `None` when encoding fails; the frame is dropped.
    pub fn process(&mut self, block: Vec<f32>) -> Option<WireFrame> {
        self.consecutive_faults = 0;
        let frame = self.gate.apply(block);

        match frame.decision {
            GateDecision::Pass => self.frames_passed += 1,
            GateDecision::Silenced => self.frames_silenced += 1,
        }

        match self.codec.encode(&frame.samples) {
            Ok(wire) => Some(wire),
            Err(e) => {
                warn!("Dropping capture frame: {}", e);
                None
            }
        }
    }

    /// Record a device fault; true once the fault limit is reached
    pub fn record_fault(&mut self, message: &str) -> bool {
        self.consecutive_faults += 1;
        debug!(
            "Capture fault {}/{}: {}",
            self.consecutive_faults, self.max_device_faults, message
        );
        self.consecutive_faults >= self.max_device_faults
    }

    pub fn frames_passed(&self) -> u64 {
        self.frames_passed
    }

    pub fn frames_silenced(&self) -> u64 {
        self.frames_silenced
    }

    pub fn reset(&mut self) {
        self.consecutive_faults = 0;
        self.frames_passed = 0;
        self.frames_silenced = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Pcm16Codec;
    use crate::session::gate::GATE_CONSTANT;

    fn pipeline() -> CapturePipeline {
        CapturePipeline::new(NoiseGate::default(), Arc::new(Pcm16Codec::default()), 3)
    }

    #[test]
    fn test_silenced_block_still_produces_frame() {
        let mut pipeline = pipeline();
        let wire = pipeline.process(vec![0.001; 4096]).unwrap();
        assert_eq!(wire.data.len(), 8192);
        assert!(wire.data.iter().all(|&b| b == 0));
        assert_eq!(wire.sample_rate, 16000);
        assert_eq!(pipeline.frames_silenced(), 1);
    }

    #[test]
    fn test_loud_block_is_encoded() {
        let mut pipeline = pipeline();
        let wire = pipeline.process(vec![0.5; 4]).unwrap();
        assert_eq!(&wire.data[..2], &16384i16.to_le_bytes());
        assert_eq!(pipeline.frames_passed(), 1);
    }

    #[test]
    fn test_sensitivity_change_applies_to_next_block() {
        let mut pipeline = pipeline();
        assert_eq!(
            pipeline.meter(vec![0.02; 16]).decision,
            GateDecision::Pass
        );
        pipeline.set_sensitivity(0.0);
        assert!((pipeline.gate().threshold() - GATE_CONSTANT).abs() < 1e-6);
        assert_eq!(
            pipeline.meter(vec![0.02; 16]).decision,
            GateDecision::Silenced
        );
    }

    #[test]
    fn test_encode_failure_drops_frame() {
        let mut pipeline = pipeline();
        pipeline.set_sensitivity(1.0);
        assert!(pipeline.process(vec![f32::INFINITY; 4]).is_none());
        assert!(pipeline.process(vec![0.1; 4]).is_some());
    }

    #[test]
    fn test_fault_limit_counts_consecutive_faults() {
        let mut pipeline = pipeline();
        assert!(!pipeline.record_fault("glitch"));
        assert!(!pipeline.record_fault("glitch"));
        pipeline.process(vec![0.1; 4]);
        assert!(!pipeline.record_fault("glitch"));
        assert!(!pipeline.record_fault("glitch"));
        assert!(pipeline.record_fault("glitch"));
    }
}
