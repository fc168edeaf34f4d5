use ringbuf::{traits::*, HeapRb};

/// Window of the most recently rendered output samples
///
/// The output callback writes every rendered frame here; the activity monitor
/// reads the energy of the window on its own cadence.
pub struct OutputTap {
    window: HeapRb<f32>,
}

impl OutputTap {
    /// Create a tap holding the last `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            window: HeapRb::new(capacity.max(1)),
        }
    }

    /// Record rendered samples, evicting the oldest ones
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.window.push_overwrite(sample);
        }
    }

    /// Root mean square of the window, zero when empty
    pub fn rms(&self) -> f32 {
        let len = self.window.occupied_len();
        if len == 0 {
            return 0.0;
        }
        let sum_squares: f32 = self.window.iter().map(|&s| s * s).sum();
        (sum_squares / len as f32).sqrt()
    }

    pub fn len(&self) -> usize {
        self.window.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
