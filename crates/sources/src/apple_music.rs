use crate::script::{self, NowPlayingDoc};
use crate::{ArtworkRef, SourceAdapter, TrackSnapshot};
use async_trait::async_trait;
use nowbar_core::{PlayerState, SourceId};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const NOW_PLAYING_SCRIPT: &str = r#"(() => {
  let app;
  try { app = Application("Music"); } catch (e) { return JSON.stringify({ state: "stopped" }); }
  if (!app.running()) { return JSON.stringify({ state: "stopped" }); }
  const doc = { state: app.playerState().toString() };
  try {
    const t = app.currentTrack();
    doc.title = t.name();
    doc.artist = t.artist();
    doc.album = t.album();
    doc.duration = t.duration();
  } catch (e) {}
  try { doc.position = app.playerPosition(); } catch (e) {}
  return JSON.stringify(doc);
})();"#;

const RUNNING_SCRIPT: &str =
    r#"(() => { try { return Application("Music").running(); } catch (e) { return false; } })();"#;

// The scripting bridge prints raw artwork bytes as a `«data tdta…»` literal.
const ARTWORK_SCRIPT: &str = r#"tell application "Music" to get data of artwork 1 of current track"#;

struct ArtworkCache {
    key: String,
    bytes: Option<Vec<u8>>,
}

/// Apple Music integration. Unlike Spotify there is no artwork URL; the
/// bytes come inline through the scripting bridge and are cached per track
/// so routine polls stay cheap.
pub struct AppleMusicAdapter {
    timeout: Duration,
    artwork: Mutex<Option<ArtworkCache>>,
}

impl AppleMusicAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            artwork: Mutex::new(None),
        }
    }

    async fn running(&self) -> bool {
        match script::run_jxa(RUNNING_SCRIPT, self.timeout).await {
            Ok(out) => out == "true",
            Err(err) => {
                debug!(error = %err, "apple music running check failed");
                false
            }
        }
    }

    async fn query(&self) -> Option<NowPlayingDoc> {
        let raw = match script::run_jxa(NOW_PLAYING_SCRIPT, self.timeout).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(error = %err, "apple music now-playing query failed");
                return None;
            }
        };
        match script::parse_now_playing(&raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                debug!(error = %err, "apple music now-playing output unreadable");
                None
            }
        }
    }

    async fn command(&self, statement: &str) {
        if !self.running().await {
            return;
        }
        if let Err(err) = script::run_applescript(statement, self.timeout).await {
            debug!(error = %err, "apple music command ignored");
        }
    }

    async fn artwork_for(&self, key: &str) -> Option<Vec<u8>> {
        if let Ok(cache) = self.artwork.lock() {
            if let Some(entry) = cache.as_ref() {
                if entry.key == key {
                    return entry.bytes.clone();
                }
            }
        }

        let bytes = match script::run_applescript(ARTWORK_SCRIPT, self.timeout).await {
            Ok(raw) => parse_artwork_data(&raw),
            Err(err) => {
                debug!(error = %err, "apple music artwork read failed");
                None
            }
        };

        if let Ok(mut cache) = self.artwork.lock() {
            *cache = Some(ArtworkCache {
                key: key.to_string(),
                bytes: bytes.clone(),
            });
        }
        bytes
    }
}

#[async_trait]
impl SourceAdapter for AppleMusicAdapter {
    fn id(&self) -> SourceId {
        SourceId::AppleMusic
    }

    async fn is_running(&self) -> bool {
        self.running().await
    }

    async fn current_track(&self) -> Option<TrackSnapshot> {
        let mut snapshot = self.query().await.and_then(NowPlayingDoc::into_snapshot)?;

        let key = format!(
            "{}\u{1f}{}\u{1f}{}",
            snapshot.title, snapshot.artist, snapshot.album
        );
        if let Some(bytes) = self.artwork_for(&key).await {
            snapshot.artwork = ArtworkRef::Inline(bytes);
        }
        Some(snapshot)
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
        self.command(r#"tell application "Music" to play"#).await;
    }

    async fn pause(&self) {
        self.command(r#"tell application "Music" to pause"#).await;
    }

    async fn play_pause(&self) {
        self.command(r#"tell application "Music" to playpause"#)
            .await;
    }

    async fn next(&self) {
        self.command(r#"tell application "Music" to next track"#)
            .await;
    }

    async fn previous(&self) {
        self.command(r#"tell application "Music" to previous track"#)
            .await;
    }

    async fn seek(&self, position: f64) {
        let clamped = position.max(0.0);
        self.command(&format!(
            r#"tell application "Music" to set player position to {clamped}"#
        ))
        .await;
    }
}

/// Decodes osascript's rendering of raw artwork data (`«data tdtaFFD8…»`)
/// into bytes. Returns `None` for anything unrecognizable.
pub fn parse_artwork_data(raw: &str) -> Option<Vec<u8>> {
    let start = raw.find("tdta")? + 4;
    let hex: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if hex.len() < 2 {
        return None;
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let digits = hex.as_bytes();
    for pair in digits.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        bytes.push(((hi << 4) | lo) as u8);
    }
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::parse_artwork_data;

    #[test]
    fn decodes_data_literal() {
        let raw = "«data tdtaFFD8FFE0»";
        assert_eq!(
            parse_artwork_data(raw),
            Some(vec![0xFF, 0xD8, 0xFF, 0xE0])
        );
    }

    #[test]
    fn rejects_non_data_output() {
        assert!(parse_artwork_data("missing value").is_none());
        assert!(parse_artwork_data("«data tdta»").is_none());
    }

    #[test]
    fn stops_at_closing_delimiter() {
        let raw = "«data tdta00FF»trailing noise";
        assert_eq!(parse_artwork_data(raw), Some(vec![0x00, 0xFF]));
    }
}
