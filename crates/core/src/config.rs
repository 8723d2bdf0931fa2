use crate::model::SourceId;
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    /// Poll cadence while the backend reports playing.
    pub playing_poll_ms: u64,
    /// Poll cadence while paused.
    pub paused_poll_ms: u64,
    /// Poll cadence while stopped / backend not running.
    pub stopped_poll_ms: u64,
    /// Seek-clock tick cadence driving position re-emission.
    pub tick_ms: u64,
    /// Upper bound on any single automation-bridge invocation.
    pub command_timeout_ms: u64,
    /// Upper bound on a remote artwork fetch.
    pub artwork_timeout_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            playing_poll_ms: 1_000,
            paused_poll_ms: 7_000,
            stopped_poll_ms: 30_000,
            tick_ms: 500,
            command_timeout_ms: 2_000,
            artwork_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Active backend. Switchable at runtime; this is only the startup value.
    pub source: SourceId,
    pub intervals: ConfigIntervals,
    /// Character budget for the rendered status line before middle truncation.
    pub status_width: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            source: SourceId::Spotify,
            intervals: ConfigIntervals::default(),
            status_width: 40,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use crate::model::SourceId;

    #[test]
    fn defaults_fill_missing_schema_version() {
        let parsed: AppConfig = toml::from_str(
            r#"
            source = "apple_music"
            status_width = 60
            log_level = "debug"

            [intervals]
            playing_poll_ms = 500
            paused_poll_ms = 5000
            stopped_poll_ms = 20000
            tick_ms = 250
            command_timeout_ms = 1000
            artwork_timeout_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.schema_version, 1);
        assert_eq!(parsed.source, SourceId::AppleMusic);
        assert_eq!(parsed.intervals.tick_ms, 250);
    }
}
