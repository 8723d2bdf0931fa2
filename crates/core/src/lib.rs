pub mod config;
pub mod model;

pub use config::{AppConfig, ConfigIntervals};
pub use model::{PlaybackState, PlayerState, SourceId, Track};
