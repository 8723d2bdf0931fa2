use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Which backend integration is active. User-selectable; exactly one is
/// active at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Spotify,
    AppleMusic,
}

impl SourceId {
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::Spotify => "Spotify",
            SourceId::AppleMusic => "Apple Music",
        }
    }

    pub fn bundle_id(&self) -> &'static str {
        match self {
            SourceId::Spotify => "com.spotify.client",
            SourceId::AppleMusic => "com.apple.Music",
        }
    }

    /// Name of the distributed-notification channel the backing app posts
    /// playback changes on.
    pub fn notification_channel(&self) -> &'static str {
        match self {
            SourceId::Spotify => "com.spotify.client.PlaybackStateChanged",
            SourceId::AppleMusic => "com.apple.Music.playerInfo",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(SourceId::Spotify),
            "apple_music" | "apple-music" | "music" => Ok(SourceId::AppleMusic),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Stopped,
}

/// Immutable snapshot of the currently loaded track. Replaced wholesale on
/// every refresh, never mutated field-by-field from outside the synchronizer
/// (artwork is the one late-arriving field, applied by the synchronizer
/// itself).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: f64,
    #[serde(skip)]
    pub artwork: Option<Vec<u8>>,
}

impl Track {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty() && self.album.is_empty()
    }
}

/// Canonical playback state. Single instance, owned by the synchronizer,
/// created with empty defaults and mutated in place for the process lifetime.
///
/// `last_observed_position` / `last_observed_at` are written only by a real
/// adapter read or an optimistic user seek. Interpolated display positions
/// are derived from them, never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub source: SourceId,
    pub track: Track,
    pub is_playing: bool,
    pub last_observed_position: f64,
    pub last_observed_at: Option<Instant>,
}

impl PlaybackState {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            track: Track::default(),
            is_playing: false,
            last_observed_position: 0.0,
            last_observed_at: None,
        }
    }

    /// Idle means no backend running or nothing loaded: empty track, not
    /// playing, position zeroed.
    pub fn is_idle(&self) -> bool {
        self.track.is_empty() && !self.is_playing
    }

    pub fn clear(&mut self) {
        self.track = Track::default();
        self.is_playing = false;
        self.last_observed_position = 0.0;
        self.last_observed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{PlaybackState, SourceId};

    #[test]
    fn source_id_parses_common_spellings() {
        assert_eq!("spotify".parse::<SourceId>().unwrap(), SourceId::Spotify);
        assert_eq!(
            "apple_music".parse::<SourceId>().unwrap(),
            SourceId::AppleMusic
        );
        assert_eq!("Music".parse::<SourceId>().unwrap(), SourceId::AppleMusic);
        assert!("winamp".parse::<SourceId>().is_err());
    }

    #[test]
    fn new_state_is_idle() {
        let state = PlaybackState::new(SourceId::Spotify);
        assert!(state.is_idle());
        assert_eq!(state.last_observed_position, 0.0);
        assert!(state.last_observed_at.is_none());
    }
}
