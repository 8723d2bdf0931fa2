use crate::{ArtworkRef, TrackSnapshot};
use nowbar_core::PlayerState;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use url::Url;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to run osascript: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("osascript failed: {0}")]
    Failed(String),
    #[error("automation bridge timed out")]
    TimedOut,
    #[error("invalid script output: {0}")]
    BadOutput(String),
}

async fn run_osascript(args: &[&str], timeout: Duration) -> Result<String, ScriptError> {
    let output = tokio::time::timeout(timeout, Command::new("osascript").args(args).output())
        .await
        .map_err(|_| ScriptError::TimedOut)??;

    if !output.status.success() {
        return Err(ScriptError::Failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|err| ScriptError::BadOutput(err.to_string()))
}

/// Runs a JXA expression and returns its stdout. Bounded by `timeout` so a
/// wedged backend cannot hang a refresh.
pub async fn run_jxa(script: &str, timeout: Duration) -> Result<String, ScriptError> {
    run_osascript(&["-l", "JavaScript", "-e", script], timeout).await
}

/// Runs a plain AppleScript statement, used for transport commands.
pub async fn run_applescript(script: &str, timeout: Duration) -> Result<String, ScriptError> {
    run_osascript(&["-e", script], timeout).await
}

/// The one JSON document both backend scripts print: player state plus the
/// loosely-populated track fields. Durations and positions are in seconds.
#[derive(Debug, Deserialize)]
pub struct NowPlayingDoc {
    pub state: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub position: Option<f64>,
    #[serde(rename = "artworkUrl")]
    pub artwork_url: Option<String>,
}

pub fn parse_now_playing(raw: &str) -> Result<NowPlayingDoc, ScriptError> {
    serde_json::from_str(raw.trim()).map_err(|err| ScriptError::BadOutput(err.to_string()))
}

impl NowPlayingDoc {
    pub fn player_state(&self) -> PlayerState {
        match self.state.as_str() {
            "playing" => PlayerState::Playing,
            "paused" => PlayerState::Paused,
            _ => PlayerState::Stopped,
        }
    }

    /// Converts the document into a track snapshot. `None` when the backend
    /// has nothing loaded; individually missing fields fall back per field.
    pub fn into_snapshot(self) -> Option<TrackSnapshot> {
        if self.player_state() == PlayerState::Stopped {
            return None;
        }
        if self.title.is_none() && self.artist.is_none() && self.album.is_none() {
            return None;
        }

        let artwork = self
            .artwork_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .map(ArtworkRef::Remote)
            .unwrap_or(ArtworkRef::None);

        Some(TrackSnapshot {
            title: self
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artist: self
                .artist
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: self.album.unwrap_or_default(),
            duration_secs: self.duration.unwrap_or(0.0).max(0.0),
            artwork,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_now_playing;
    use crate::ArtworkRef;
    use nowbar_core::PlayerState;

    #[test]
    fn parses_full_document() {
        let doc = parse_now_playing(
            r#"{"state":"playing","title":"Song A","artist":"Artist X","album":"LP",
                "duration":200.0,"position":10.0,
                "artworkUrl":"https://i.scdn.co/image/abc123"}"#,
        )
        .unwrap();

        assert_eq!(doc.player_state(), PlayerState::Playing);
        let snapshot = doc.into_snapshot().unwrap();
        assert_eq!(snapshot.title, "Song A");
        assert_eq!(snapshot.duration_secs, 200.0);
        assert!(matches!(snapshot.artwork, ArtworkRef::Remote(_)));
    }

    #[test]
    fn missing_fields_fall_back_independently() {
        let doc =
            parse_now_playing(r#"{"state":"paused","album":"LP","duration":90.0}"#).unwrap();
        let snapshot = doc.into_snapshot().unwrap();

        assert_eq!(snapshot.title, "Unknown Title");
        assert_eq!(snapshot.artist, "Unknown Artist");
        assert_eq!(snapshot.album, "LP");
        assert_eq!(snapshot.artwork, ArtworkRef::None);
    }

    #[test]
    fn stopped_state_yields_no_snapshot() {
        let doc = parse_now_playing(r#"{"state":"stopped"}"#).unwrap();
        assert!(doc.into_snapshot().is_none());
    }

    #[test]
    fn empty_document_yields_no_snapshot() {
        let doc = parse_now_playing(r#"{"state":"playing"}"#).unwrap();
        assert!(doc.into_snapshot().is_none());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_now_playing("execution error: Music got an error").is_err());
    }
}
