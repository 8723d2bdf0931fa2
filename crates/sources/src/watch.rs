use crate::notifier::RefreshHint;
use crate::SourceAdapter;
use nowbar_core::{ConfigIntervals, PlayerState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Position jumps larger than this (beyond normal advancement) are treated
/// as a seek performed outside this process.
const DISCONTINUITY_TOLERANCE_SECS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
struct Observation {
    state: PlayerState,
    identity: Option<(String, String, String)>,
    position: f64,
    at: Instant,
}

/// Change detection between consecutive polls. A hint is warranted when the
/// play state flips, the track identity changes, or the position deviates
/// from where normal playback would have taken it.
#[derive(Default)]
struct WatchState {
    last: Option<Observation>,
}

impl WatchState {
    fn observe(&mut self, obs: Observation) -> bool {
        let changed = match &self.last {
            None => true,
            Some(prev) => {
                prev.state != obs.state
                    || prev.identity != obs.identity
                    || position_discontinuity(prev, &obs)
            }
        };
        self.last = Some(obs);
        changed
    }
}

fn position_discontinuity(prev: &Observation, curr: &Observation) -> bool {
    let elapsed = curr.at.duration_since(prev.at).as_secs_f64();
    let predicted = if prev.state == PlayerState::Playing {
        prev.position + elapsed
    } else {
        prev.position
    };
    (curr.position - predicted).abs() > DISCONTINUITY_TOLERANCE_SECS
}

/// Synthesizes refresh hints by polling the active adapter at
/// state-dependent cadences. This is the driver for environments without a
/// push notification feed; both merge into the same hint stream.
pub struct PollWatcher {
    playing_poll: Duration,
    paused_poll: Duration,
    stopped_poll: Duration,
    tx: mpsc::Sender<RefreshHint>,
}

impl PollWatcher {
    pub fn new(intervals: &ConfigIntervals, tx: mpsc::Sender<RefreshHint>) -> Self {
        Self {
            playing_poll: Duration::from_millis(intervals.playing_poll_ms),
            paused_poll: Duration::from_millis(intervals.paused_poll_ms),
            stopped_poll: Duration::from_millis(intervals.stopped_poll_ms),
            tx,
        }
    }

    /// Runs until the hint receiver goes away. The caller aborts and
    /// respawns this when the active source changes.
    pub async fn run(self, adapter: Arc<dyn SourceAdapter>) {
        let mut watch = WatchState::default();
        debug!(source = %adapter.id(), "poll watcher started");

        loop {
            let state = adapter.player_state().await;
            let identity = adapter
                .current_track()
                .await
                .map(|s| (s.title, s.artist, s.album));
            let position = adapter.position().await;

            let changed = watch.observe(Observation {
                state,
                identity,
                position,
                at: Instant::now(),
            });

            if changed {
                let hint = RefreshHint {
                    reported_stopped: state == PlayerState::Stopped,
                };
                if self.tx.send(hint).await.is_err() {
                    debug!("hint receiver gone, stopping poll watcher");
                    return;
                }
            }

            let cadence = match state {
                PlayerState::Playing => self.playing_poll,
                PlayerState::Paused => self.paused_poll,
                PlayerState::Stopped => self.stopped_poll,
            };
            tokio::time::sleep(cadence).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Observation, WatchState};
    use nowbar_core::PlayerState;
    use std::time::{Duration, Instant};

    fn obs(
        state: PlayerState,
        title: Option<&str>,
        position: f64,
        at: Instant,
    ) -> Observation {
        Observation {
            state,
            identity: title.map(|t| (t.to_string(), "Artist".to_string(), "Album".to_string())),
            position,
            at,
        }
    }

    #[test]
    fn first_observation_requests_refresh() {
        let mut watch = WatchState::default();
        assert!(watch.observe(obs(
            PlayerState::Stopped,
            None,
            0.0,
            Instant::now()
        )));
    }

    #[test]
    fn steady_playback_is_quiet() {
        let mut watch = WatchState::default();
        let t0 = Instant::now();

        watch.observe(obs(PlayerState::Playing, Some("A"), 10.0, t0));
        assert!(!watch.observe(obs(
            PlayerState::Playing,
            Some("A"),
            11.0,
            t0 + Duration::from_secs(1)
        )));
    }

    #[test]
    fn state_flip_and_track_change_request_refresh() {
        let mut watch = WatchState::default();
        let t0 = Instant::now();

        watch.observe(obs(PlayerState::Playing, Some("A"), 10.0, t0));
        assert!(watch.observe(obs(
            PlayerState::Paused,
            Some("A"),
            11.0,
            t0 + Duration::from_secs(1)
        )));
        assert!(watch.observe(obs(
            PlayerState::Paused,
            Some("B"),
            0.0,
            t0 + Duration::from_secs(2)
        )));
    }

    #[test]
    fn external_seek_requests_refresh() {
        let mut watch = WatchState::default();
        let t0 = Instant::now();

        watch.observe(obs(PlayerState::Playing, Some("A"), 10.0, t0));
        assert!(watch.observe(obs(
            PlayerState::Playing,
            Some("A"),
            90.0,
            t0 + Duration::from_secs(1)
        )));
    }

    #[test]
    fn paused_position_stays_quiet() {
        let mut watch = WatchState::default();
        let t0 = Instant::now();

        watch.observe(obs(PlayerState::Paused, Some("A"), 42.0, t0));
        assert!(!watch.observe(obs(
            PlayerState::Paused,
            Some("A"),
            42.0,
            t0 + Duration::from_secs(30)
        )));
    }
}
