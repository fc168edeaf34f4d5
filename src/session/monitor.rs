//! Output activity meter for the UI

/// Lower edge of the mapped range, in dBFS
pub const MIN_DECIBELS: f32 = -100.0;
/// Upper edge of the mapped range, in dBFS
pub const MAX_DECIBELS: f32 = -30.0;

/// Map an RMS energy reading to 0..=255
///
/// Readings outside the range, and NaN, clamp into it.
pub fn energy_to_volume(rms: f32) -> u8 {
    if rms.is_nan() || rms <= 0.0 {
        return 0;
    }
    let db = 20.0 * rms.log10();
    let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
    if scaled.is_nan() {
        return 0;
    }
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Samples output energy on a fixed cadence
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeMonitor {
    last: u8,
}

impl VolumeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one reading; pinned to zero while the agent is not speaking
    pub fn sample(&mut self, is_speaking: bool, output_rms: f32) -> u8 {
        self.last = if is_speaking {
            energy_to_volume(output_rms)
        } else {
            0
        };
        self.last
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_maps_to_zero() {
        assert_eq!(energy_to_volume(0.0), 0);
        assert_eq!(energy_to_volume(-1.0), 0);
        assert_eq!(energy_to_volume(f32::NAN), 0);
        // -120 dBFS, below the floor
        assert_eq!(energy_to_volume(1e-6), 0);
    }

    #[test]
    fn test_loud_output_saturates() {
        assert_eq!(energy_to_volume(1.0), 255);
        assert_eq!(energy_to_volume(f32::INFINITY), 255);
    }

    #[test]
    fn test_midpoint() {
        // -65 dBFS sits halfway
        let rms = 10f32.powf(-65.0 / 20.0);
        let v = energy_to_volume(rms);
        assert!((127..=128).contains(&v), "got {}", v);
    }

    #[test]
    fn test_pinned_to_zero_when_not_speaking() {
        let mut monitor = VolumeMonitor::new();
        assert!(monitor.sample(true, 0.5) > 0);
        assert_eq!(monitor.sample(false, 0.5), 0);
        assert_eq!(monitor.last(), 0);
    }

    #[test]
    fn test_volume_tracks_energy() {
        let mut monitor = VolumeMonitor::new();
        let quiet = monitor.sample(true, 0.001);
        let loud = monitor.sample(true, 0.01);
        assert!(loud > quiet);
    }
}
