use crate::audio::buffer::OutputTap;
use crate::audio::resampler::StreamResampler;
use crate::Result;

struct Voice {
    id: u64,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sample-accurate mixer behind the output callback
///
/// The mixer runs at the wire rate, so clips are added untouched. Its frame
/// counter is the sink clock and only advances as frames are rendered.
pub struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    /// End frame of the latest clip added
    tail_frame: u64,
    voices: Vec<Voice>,
    finished: Vec<u64>,
    tap: OutputTap,
}

impl Mixer {
    pub fn new(sample_rate: u32, tap_capacity: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            tail_frame: 0,
            voices: Vec::new(),
            finished: Vec::new(),
            tap: OutputTap::new(tap_capacity),
        }
    }

    /// Seconds rendered so far
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Add mono samples (at the mixer rate) starting at `start_at` seconds
    ///
    /// A start within one frame of the previous clip's end continues exactly
    /// at that end frame. A start already in the past begins at the next
    /// rendered frame.
    pub fn add(&mut self, id: u64, samples: Vec<f32>, start_at: f64) {
        let exact = start_at.max(0.0) * self.sample_rate as f64;
        let requested = if (exact - self.tail_frame as f64).abs() < 1.0 {
            self.tail_frame
        } else {
            exact.round() as u64
        };
        let start_frame = requested.max(self.frames_rendered);

        if samples.is_empty() {
            self.finished.push(id);
            return;
        }

        let voice = Voice {
            id,
            start_frame,
            samples,
        };
        self.tail_frame = voice.end_frame();
        self.voices.push(voice);
    }

    /// Drop a voice without reporting it as finished
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.finished.retain(|&f| f != id);
        before != self.voices.len()
    }

    /// Render the next `out.len()` mono frames
    pub fn render(&mut self, out: &mut [f32]) {
        let window_start = self.frames_rendered;
        let window_end = window_start + out.len() as u64;

        out.fill(0.0);
        for voice in &self.voices {
            let from = voice.start_frame.max(window_start);
            let to = voice.end_frame().min(window_end);
            for abs in from..to {
                out[(abs - window_start) as usize] += voice.samples[(abs - voice.start_frame) as usize];
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.tap.push(out);
        self.frames_rendered = window_end;

        let finished = &mut self.finished;
        self.voices.retain(|voice| {
            if voice.end_frame() <= window_end {
                finished.push(voice.id);
                false
            } else {
                true
            }
        });
    }

    /// Hand finished ids to `deliver`; ids it refuses stay queued
    pub fn drain_finished(&mut self, mut deliver: impl FnMut(u64) -> bool) {
        self.finished.retain(|&id| !deliver(id));
    }

    pub fn active_len(&self) -> usize {
        self.voices.len()
    }

    pub fn output_rms(&self) -> f32 {
        self.tap.rms()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
        self.finished.clear();
        self.tap.clear();
        self.tail_frame = self.frames_rendered;
    }
}

/// Converts the mixer's wire-rate output to the device rate
///
/// One resampler runs across the whole stream, so clip joins stay
/// continuous. The mixer is pulled in fixed quanta and the converted frames
/// are handed out as the device asks for them. Nothing allocates after the
/// first few callbacks.
pub struct RateBridge {
    resampler: StreamResampler,
    quantum: Vec<f32>,
    ready: Vec<f32>,
    cursor: usize,
}

impl RateBridge {
    pub fn new(wire_rate: u32, device_rate: u32, quantum: usize) -> Result<Self> {
        let quantum = quantum.max(1);
        Ok(Self {
            resampler: StreamResampler::new(wire_rate, device_rate)?,
            quantum: vec![0.0; quantum],
            ready: Vec::with_capacity(quantum * 8),
            cursor: 0,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_passthrough()
    }

    /// Fill interleaved `out`, calling `pull` to render each wire quantum
    pub fn fill(
        &mut self,
        out: &mut [f32],
        channels: usize,
        mut pull: impl FnMut(&mut [f32]),
    ) -> Result<()> {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        let mut written = 0;
        while written < frames {
            if self.cursor >= self.ready.len() {
                self.ready.clear();
                self.cursor = 0;
                pull(&mut self.quantum);
                self.resampler.process_into(&self.quantum, &mut self.ready)?;
                continue;
            }

            let take = (frames - written).min(self.ready.len() - self.cursor);
            let source = &self.ready[self.cursor..self.cursor + take];
            let target = &mut out[written * channels..(written + take) * channels];
            for (frame, &sample) in target.chunks_mut(channels).zip(source) {
                frame.fill(sample);
            }
            written += take;
            self.cursor += take;
        }

        // Trailing partial frame, if any
        out[frames * channels..].fill(0.0);
        Ok(())
    }
}
