//! Gapless scheduling of inbound speech chunks

use crate::audio::device::PlaybackSink;
use crate::codec::AudioCodec;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A chunk handed to the sink and not yet finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackItem {
    pub id: u64,
    pub start_time: f64,
    pub duration: f64,
}

impl PlaybackItem {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Queues decoded chunks back to back on the sink clock
///
/// `next_start_time` never moves backwards except on interruption, where it
/// snaps to the sink clock at that moment.
pub struct PlaybackScheduler {
    codec: Arc<dyn AudioCodec>,
    next_start_time: f64,
    active: BTreeMap<u64, PlaybackItem>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            codec,
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Decode a chunk and schedule it right after the previous one
    ///
    /// Decode errors leave the schedule untouched.
    pub fn enqueue(&mut self, payload: &[u8], sink: &mut dyn PlaybackSink) -> Result<PlaybackItem> {
        let audio = self.codec.decode(payload)?;
        let duration = audio.duration_seconds();
        let start_time = self.next_start_time.max(sink.current_time());

        let id = self.next_id;
        sink.schedule(id, audio, start_time)?;
        self.next_id += 1;

        let item = PlaybackItem {
            id,
            start_time,
            duration,
        };
        self.next_start_time = item.end_time();
        self.active.insert(id, item);

        debug!(
            "Scheduled chunk {} at {:.3}s for {:.3}s ({} active)",
            id,
            start_time,
            duration,
            self.active.len()
        );
        Ok(item)
    }

    /// Handle a natural end notice
    ///
    /// Returns true when this ended the agent's speech. Unknown ids are
    /// ignored.
    pub fn on_item_ended(&mut self, id: u64) -> bool {
        if self.active.remove(&id).is_none() {
            debug!("Ignoring end notice for unknown chunk {}", id);
            return false;
        }
        self.active.is_empty()
    }

    /// Cut all speech and restart the clock from now
    ///
    /// Returns true if anything was playing.
    pub fn interrupt(&mut self, sink: &mut dyn PlaybackSink) -> bool {
        let was_speaking = self.stop_all(sink);
        self.next_start_time = sink.current_time();
        was_speaking
    }

    /// Stop every active item without touching the clock
    pub fn stop_all(&mut self, sink: &mut dyn PlaybackSink) -> bool {
        let was_speaking = self.is_speaking();
        for id in self.active.keys() {
            sink.stop(*id);
        }
        self.active.clear();
        was_speaking
    }

    /// Forget everything; for a fresh sink
    pub fn reset(&mut self) {
        self.active.clear();
        self.next_start_time = 0.0;
    }
}
