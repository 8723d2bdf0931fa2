pub mod clock;
pub mod events;
pub mod synchronizer;

pub use clock::{PositionClock, SeekTicker};
pub use events::{NowPlaying, StateEvent};
pub use synchronizer::{
    AdapterFactory, ArtworkFetcher, FollowUp, LyricsSource, Synchronizer,
};
