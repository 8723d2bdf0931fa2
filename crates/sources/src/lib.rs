use async_trait::async_trait;
use nowbar_core::{PlayerState, SourceId};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod apple_music;
pub mod notifier;
pub mod script;
pub mod spotify;
pub mod watch;

pub use notifier::{ChangeNotifier, RawNotification, RefreshHint};
pub use script::ScriptError;
pub use watch::PollWatcher;

/// Where a track's artwork can be obtained. Inline bytes are applied to the
/// canonical state synchronously; remote references are fetched off the
/// refresh path.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtworkRef {
    None,
    Inline(Vec<u8>),
    Remote(Url),
}

/// One read of the backend's current track. Metadata fields are already
/// fallback-filled; a snapshot is only `None` when no track is loaded at all.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    pub artwork: ArtworkRef,
}

impl TrackSnapshot {
    /// Identity used to detect track changes between observations.
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.title, &self.artist, &self.album)
    }
}

/// Capability interface to one external music-playing application.
///
/// Every read must be safe to call when the backing app is not running and
/// return defaults (stopped / none / 0.0) instead of failing. Commands are
/// fire-and-forget: a backend that is not running or not authorized simply
/// ignores them.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    async fn is_running(&self) -> bool;
    async fn current_track(&self) -> Option<TrackSnapshot>;
    async fn player_state(&self) -> PlayerState;
    async fn position(&self) -> f64;

    async fn play(&self);
    async fn pause(&self);
    async fn play_pause(&self);
    async fn next(&self);
    async fn previous(&self);
    async fn seek(&self, position: f64);
}

/// Builds the adapter for the selected backend. Shared so the synchronizer
/// and the poll watcher observe the same instance.
pub fn build_adapter(id: SourceId, command_timeout: Duration) -> Arc<dyn SourceAdapter> {
    match id {
        SourceId::Spotify => Arc::new(spotify::SpotifyAdapter::new(command_timeout)),
        SourceId::AppleMusic => Arc::new(apple_music::AppleMusicAdapter::new(command_timeout)),
    }
}
