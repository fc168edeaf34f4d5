//! Noise gate and loudness meter for captured blocks

/// Scale applied to `1 - sensitivity` to get the gate threshold
pub const GATE_CONSTANT: f32 = 0.05;

pub const DEFAULT_SENSITIVITY: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Silenced,
}

/// One block after metering and gating
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub samples: Vec<f32>,
    pub rms: f32,
    pub decision: GateDecision,
}

/// Root mean square of a block; zero for an empty block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Sensitivity-driven hard gate
#[derive(Debug, Clone, Copy)]
pub struct NoiseGate {
    sensitivity: f32,
    constant: f32,
}

impl NoiseGate {
    pub fn new(sensitivity: f32, constant: f32) -> Self {
        Self {
            sensitivity: clamp_sensitivity(sensitivity),
            constant: constant.max(0.0),
        }
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = clamp_sensitivity(sensitivity);
    }

    /// Blocks quieter than this are silenced
    pub fn threshold(&self) -> f32 {
        (1.0 - self.sensitivity) * self.constant
    }

    /// Meter a block and zero it out if it falls under the threshold
    ///
    /// The output always has the same length as the input.
    pub fn apply(&self, mut samples: Vec<f32>) -> CapturedFrame {
        let level = rms(&samples);
        // NaN never passes
        let decision = if level >= self.threshold() {
            GateDecision::Pass
        } else {
            GateDecision::Silenced
        };

        if decision == GateDecision::Silenced {
            samples.iter_mut().for_each(|s| *s = 0.0);
        }

        CapturedFrame {
            samples,
            rms: level,
            decision,
        }
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVITY, GATE_CONSTANT)
    }
}

fn clamp_sensitivity(value: f32) -> f32 {
    if value.is_nan() {
        DEFAULT_SENSITIVITY
    } else {
        value.clamp(0.0, 1.0)
    }
}
