use crate::script::{self, NowPlayingDoc};
use crate::{SourceAdapter, TrackSnapshot};
use async_trait::async_trait;
use nowbar_core::{PlayerState, SourceId};
use std::time::Duration;
use tracing::debug;

// Spotify's scripting bridge reports durations in milliseconds; the script
// normalizes to seconds so both backends print the same document.
const NOW_PLAYING_SCRIPT: &str = r#"(() => {
  let app;
  try { app = Application("Spotify"); } catch (e) { return JSON.stringify({ state: "stopped" }); }
  if (!app.running()) { return JSON.stringify({ state: "stopped" }); }
  const doc = { state: app.playerState().toString() };
  try {
    const t = app.currentTrack();
    doc.title = t.name();
    doc.artist = t.artist();
    doc.album = t.album();
    doc.duration = t.duration() / 1000;
    doc.artworkUrl = t.artworkUrl();
  } catch (e) {}
  try { doc.position = app.playerPosition(); } catch (e) {}
  return JSON.stringify(doc);
})();"#;

const RUNNING_SCRIPT: &str =
    r#"(() => { try { return Application("Spotify").running(); } catch (e) { return false; } })();"#;

pub struct SpotifyAdapter {
    timeout: Duration,
}

impl SpotifyAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn running(&self) -> bool {
        match script::run_jxa(RUNNING_SCRIPT, self.timeout).await {
            Ok(out) => out == "true",
            Err(err) => {
                debug!(error = %err, "spotify running check failed");
                false
            }
        }
    }

    async fn query(&self) -> Option<NowPlayingDoc> {
        let raw = match script::run_jxa(NOW_PLAYING_SCRIPT, self.timeout).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(error = %err, "spotify now-playing query failed");
                return None;
            }
        };
        match script::parse_now_playing(&raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                debug!(error = %err, "spotify now-playing output unreadable");
                None
            }
        }
    }

    // Commands are deliberately silent: a backend that is not running or not
    // authorized ignores them. Guarding on running avoids osascript
    // launching Spotify as a side effect of `tell application`.
    async fn command(&self, statement: &str) {
        if !self.running().await {
            return;
        }
        if let Err(err) = script::run_applescript(statement, self.timeout).await {
            debug!(error = %err, "spotify command ignored");
        }
    }
}

#[async_trait]
impl SourceAdapter for SpotifyAdapter {
    fn id(&self) -> SourceId {
        SourceId::Spotify
    }

    async fn is_running(&self) -> bool {
        self.running().await
    }

    async fn current_track(&self) -> Option<TrackSnapshot> {
        self.query().await.and_then(NowPlayingDoc::into_snapshot)
    }

    async fn player_state(&self) -> PlayerState {
        self.query()
            .await
            .map(|doc| doc.player_state())
            .unwrap_or(PlayerState::Stopped)
    }

    async fn position(&self) -> f64 {
        self.query()
            .await
            .and_then(|doc| doc.position)
            .unwrap_or(0.0)
            .max(0.0)
    }

    async fn play(&self) {
        self.command(r#"tell application "Spotify" to play"#).await;
    }

    async fn pause(&self) {
        self.command(r#"tell application "Spotify" to pause"#).await;
    }

    async fn play_pause(&self) {
        self.command(r#"tell application "Spotify" to playpause"#)
            .await;
    }

    async fn next(&self) {
        self.command(r#"tell application "Spotify" to next track"#)
            .await;
    }

    async fn previous(&self) {
        self.command(r#"tell application "Spotify" to previous track"#)
            .await;
    }

    async fn seek(&self, position: f64) {
        let clamped = position.max(0.0);
        self.command(&format!(
            r#"tell application "Spotify" to set player position to {clamped}"#
        ))
        .await;
    }
}
