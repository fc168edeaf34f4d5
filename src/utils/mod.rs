pub mod channels;

pub use channels::{CaptureSender, ChannelEventSender, PlaybackNotifier, SessionInput};
