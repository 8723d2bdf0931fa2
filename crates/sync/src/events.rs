use serde::Serialize;
use tokio::sync::broadcast;

/// The contract payload presentation surfaces bind to, emitted on every
/// state mutation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub is_playing: bool,
}

/// Outbound change events. `NowPlaying` carries the core contract; the rest
/// are partial updates so slow fetches never hold up the text fields.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    NowPlaying(NowPlaying),
    Artwork(Option<Vec<u8>>),
    Position { position: f64, duration: f64 },
    Lyrics(Option<String>),
}

pub fn channel(capacity: usize) -> broadcast::Sender<StateEvent> {
    broadcast::channel(capacity).0
}
