use crate::clock::PositionClock;
use crate::events::{NowPlaying, StateEvent};
use async_trait::async_trait;
use nowbar_core::{PlaybackState, PlayerState, SourceId, Track};
use nowbar_sources::{ArtworkRef, RefreshHint, SourceAdapter, TrackSnapshot};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use url::Url;

/// Fetches remote artwork bytes on a background I/O path.
#[async_trait]
pub trait ArtworkFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url) -> anyhow::Result<Vec<u8>>;
}

/// Narrow seam to the external lyrics collaborator. Any failure means
/// "no lyrics available"; it never reaches playback state.
#[async_trait]
pub trait LyricsSource: Send + Sync + 'static {
    async fn fetch(&self, artist: &str, title: &str) -> anyhow::Result<Option<String>>;
}

/// Late results from background fetches, marshaled back onto the task that
/// owns the synchronizer before any state is touched.
#[derive(Debug)]
pub enum FollowUp {
    Artwork {
        generation: u64,
        bytes: Option<Vec<u8>>,
    },
    Lyrics {
        generation: u64,
        text: Option<String>,
    },
}

pub type AdapterFactory = Arc<dyn Fn(SourceId) -> Arc<dyn SourceAdapter> + Send + Sync>;

/// Owner of the canonical playback state. Pulls fresh data through the
/// active adapter on each refresh hint, drives the interpolated position
/// estimate, and fans out change events.
///
/// All methods run on one logical task; the only concurrent work is the
/// best-effort artwork/lyrics fetches, whose results come back through the
/// follow-up channel tagged with a track generation so stale completions
/// are discarded.
pub struct Synchronizer {
    factory: AdapterFactory,
    adapter: Arc<dyn SourceAdapter>,
    state: PlaybackState,
    clock: PositionClock,
    events: broadcast::Sender<StateEvent>,
    follow_up: mpsc::Sender<FollowUp>,
    artwork_fetcher: Option<Arc<dyn ArtworkFetcher>>,
    lyrics: Option<Arc<dyn LyricsSource>>,
    generation: u64,
}

impl Synchronizer {
    pub fn new(
        source: SourceId,
        factory: AdapterFactory,
        follow_up: mpsc::Sender<FollowUp>,
    ) -> Self {
        let adapter = (factory)(source);
        Self {
            factory,
            adapter,
            state: PlaybackState::new(source),
            clock: PositionClock::default(),
            events: crate::events::channel(32),
            follow_up,
            artwork_fetcher: None,
            lyrics: None,
            generation: 0,
        }
    }

    pub fn with_artwork_fetcher(mut self, fetcher: Arc<dyn ArtworkFetcher>) -> Self {
        self.artwork_fetcher = Some(fetcher);
        self
    }

    pub fn with_lyrics_source(mut self, lyrics: Arc<dyn LyricsSource>) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Shared handle to the active adapter, for drivers polling alongside.
    pub fn adapter(&self) -> Arc<dyn SourceAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Interpolated position for display at `now`.
    pub fn estimate(&self, now: Instant) -> f64 {
        self.clock.estimate(now, self.state.track.duration_secs)
    }

    /// Pulls fresh data through the adapter and updates the canonical state.
    /// A stop hint or an unreachable backend degrades to Idle, never to an
    /// error.
    pub async fn refresh(&mut self, hint: RefreshHint, now: Instant) {
        if hint.reported_stopped || !self.adapter.is_running().await {
            self.enter_idle();
            return;
        }

        let player_state = self.adapter.player_state().await;
        if player_state == PlayerState::Stopped {
            self.enter_idle();
            return;
        }

        // A running player with nothing loaded is indistinguishable from
        // stopped for every consumer.
        let Some(snapshot) = self.adapter.current_track().await else {
            self.enter_idle();
            return;
        };

        let position = self.adapter.position().await;
        self.apply_snapshot(snapshot, player_state, position, now);
    }

    /// Rebinds to another backend and refreshes immediately. Any in-flight
    /// fetch for the previous track is invalidated before the new adapter is
    /// queried, so a stale completion can never overwrite the new track.
    pub async fn switch_source(&mut self, source: SourceId, now: Instant) {
        info!(source = %source, "switching active source");
        self.generation += 1;
        self.adapter = (self.factory)(source);
        self.state.source = source;
        self.state.clear();
        self.clock.reset();
        self.refresh(RefreshHint::default(), now).await;
    }

    /// Forwards a seek and applies it optimistically so the displayed
    /// position never snaps back while the round trip completes.
    pub async fn seek(&mut self, position: f64, now: Instant) {
        let clamped = position.clamp(0.0, self.state.track.duration_secs.max(0.0));
        self.adapter.seek(clamped).await;
        self.state.last_observed_position = clamped;
        self.state.last_observed_at = Some(now);
        self.clock.observe(clamped, now, self.state.is_playing);
        self.emit_now_playing();
    }

    pub async fn play_pause(&self) {
        self.adapter.play_pause().await;
    }

    pub async fn next_track(&self) {
        self.adapter.next().await;
    }

    pub async fn previous_track(&self) {
        self.adapter.previous().await;
    }

    /// Periodic re-evaluation of the estimate for the display surfaces.
    pub fn tick(&mut self, now: Instant) {
        if self.state.is_idle() {
            return;
        }
        let _ = self.events.send(StateEvent::Position {
            position: self.estimate(now),
            duration: self.state.track.duration_secs,
        });
    }

    /// Applies a completed background fetch. Results from a superseded track
    /// or source are discarded.
    pub fn apply_follow_up(&mut self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Artwork { generation, bytes } => {
                if generation != self.generation {
                    debug!("discarding stale artwork result");
                    return;
                }
                if let Some(bytes) = bytes {
                    self.state.track.artwork = Some(bytes.clone());
                    let _ = self.events.send(StateEvent::Artwork(Some(bytes)));
                }
            }
            FollowUp::Lyrics { generation, text } => {
                if generation != self.generation {
                    debug!("discarding stale lyrics result");
                    return;
                }
                let _ = self.events.send(StateEvent::Lyrics(text));
            }
        }
    }

    fn apply_snapshot(
        &mut self,
        snapshot: TrackSnapshot,
        player_state: PlayerState,
        position: f64,
        now: Instant,
    ) {
        let track_changed = (
            self.state.track.title.as_str(),
            self.state.track.artist.as_str(),
            self.state.track.album.as_str(),
        ) != snapshot.identity();
        let is_playing = player_state == PlayerState::Playing;

        let mut artwork = if track_changed {
            None
        } else {
            self.state.track.artwork.take()
        };
        let mut remote = None;
        match snapshot.artwork {
            ArtworkRef::Inline(bytes) => artwork = Some(bytes),
            ArtworkRef::Remote(url) if track_changed => remote = Some(url),
            _ => {}
        }

        self.state.track = Track {
            title: snapshot.title,
            artist: snapshot.artist,
            album: snapshot.album,
            duration_secs: snapshot.duration_secs,
            artwork,
        };
        self.state.is_playing = is_playing;
        self.state.last_observed_position = position;
        self.state.last_observed_at = Some(now);
        self.clock.observe(position, now, is_playing);

        self.emit_now_playing();

        if track_changed {
            self.generation += 1;
            // Text fields are already out; artwork and lyrics follow as
            // partial updates whenever they arrive.
            let _ = self
                .events
                .send(StateEvent::Artwork(self.state.track.artwork.clone()));
            if let Some(url) = remote {
                self.spawn_artwork_fetch(url);
            }
            self.spawn_lyrics_fetch();
        }
    }

    fn enter_idle(&mut self) {
        self.generation += 1;
        let was_idle = self.state.is_idle();
        self.state.clear();
        self.clock.reset();
        if !was_idle {
            debug!("backend stopped or gone, entering idle");
        }
        self.emit_now_playing();
    }

    fn emit_now_playing(&self) {
        let _ = self.events.send(StateEvent::NowPlaying(NowPlaying {
            title: self.state.track.title.clone(),
            artist: self.state.track.artist.clone(),
            is_playing: self.state.is_playing,
        }));
    }

    fn spawn_artwork_fetch(&self, url: Url) {
        let Some(fetcher) = self.artwork_fetcher.clone() else {
            return;
        };
        let generation = self.generation;
        let tx = self.follow_up.clone();
        tokio::spawn(async move {
            let bytes = match fetcher.fetch(&url).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    debug!(error = %err, "artwork fetch failed");
                    None
                }
            };
            let _ = tx.send(FollowUp::Artwork { generation, bytes }).await;
        });
    }

    fn spawn_lyrics_fetch(&self) {
        let Some(lyrics) = self.lyrics.clone() else {
            return;
        };
        let generation = self.generation;
        let tx = self.follow_up.clone();
        let artist = self.state.track.artist.clone();
        let title = self.state.track.title.clone();
        tokio::spawn(async move {
            let text = match lyrics.fetch(&artist, &title).await {
                Ok(text) => text,
                Err(err) => {
                    debug!(error = %err, "lyrics fetch failed");
                    None
                }
            };
            let _ = tx.send(FollowUp::Lyrics { generation, text }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterFactory, ArtworkFetcher, Synchronizer};
    use crate::events::StateEvent;
    use async_trait::async_trait;
    use nowbar_core::{PlayerState, SourceId};
    use nowbar_sources::{ArtworkRef, RefreshHint, SourceAdapter, TrackSnapshot};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;
    use url::Url;

    #[derive(Default)]
    struct BackendState {
        running: bool,
        player_state: Option<PlayerState>,
        track: Option<TrackSnapshot>,
        position: f64,
        seeks: Vec<f64>,
    }

    #[derive(Clone, Default)]
    struct MockBackend {
        state: Arc<Mutex<BackendState>>,
    }

    impl MockBackend {
        fn set_playing(&self, title: &str, duration: f64, position: f64) {
            let mut s = self.state.lock().unwrap();
            s.running = true;
            s.player_state = Some(PlayerState::Playing);
            s.track = Some(TrackSnapshot {
                title: title.to_string(),
                artist: "Artist X".to_string(),
                album: "Album".to_string(),
                duration_secs: duration,
                artwork: ArtworkRef::None,
            });
            s.position = position;
        }

        fn set_artwork(&self, artwork: ArtworkRef) {
            let mut s = self.state.lock().unwrap();
            if let Some(track) = s.track.as_mut() {
                track.artwork = artwork;
            }
        }

        fn seeks(&self) -> Vec<f64> {
            self.state.lock().unwrap().seeks.clone()
        }
    }

    struct MockAdapter {
        id: SourceId,
        backend: MockBackend,
    }

    #[async_trait]
    impl SourceAdapter for MockAdapter {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn is_running(&self) -> bool {
            self.backend.state.lock().unwrap().running
        }

        async fn current_track(&self) -> Option<TrackSnapshot> {
            self.backend.state.lock().unwrap().track.clone()
        }

        async fn player_state(&self) -> PlayerState {
            self.backend
                .state
                .lock()
                .unwrap()
                .player_state
                .unwrap_or(PlayerState::Stopped)
        }

        async fn position(&self) -> f64 {
            self.backend.state.lock().unwrap().position
        }

        async fn play(&self) {}
        async fn pause(&self) {}
        async fn play_pause(&self) {}
        async fn next(&self) {}
        async fn previous(&self) {}

        async fn seek(&self, position: f64) {
            self.backend.state.lock().unwrap().seeks.push(position);
        }
    }

    struct StubFetcher {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl ArtworkFetcher for StubFetcher {
        async fn fetch(&self, _url: &Url) -> anyhow::Result<Vec<u8>> {
            Ok(self.bytes.clone())
        }
    }

    fn factory_for(backends: HashMap<SourceId, MockBackend>) -> AdapterFactory {
        Arc::new(move |id| {
            let backend = backends.get(&id).cloned().unwrap_or_default();
            Arc::new(MockAdapter { id, backend }) as Arc<dyn SourceAdapter>
        })
    }

    fn single_backend() -> (MockBackend, AdapterFactory) {
        let backend = MockBackend::default();
        let mut backends = HashMap::new();
        backends.insert(SourceId::Spotify, backend.clone());
        (backend, factory_for(backends))
    }

    fn drain_now_playing(
        rx: &mut tokio::sync::broadcast::Receiver<StateEvent>,
    ) -> Vec<crate::events::NowPlaying> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StateEvent::NowPlaying(np) = event {
                out.push(np);
            }
        }
        out
    }

    #[tokio::test]
    async fn dead_backend_refreshes_to_idle() {
        let (_backend, factory) = single_backend();
        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);
        let mut events = sync.subscribe();

        sync.refresh(RefreshHint::default(), Instant::now()).await;

        assert!(sync.state().is_idle());
        assert_eq!(sync.state().track.title, "");
        assert_eq!(sync.state().last_observed_position, 0.0);

        let emitted = drain_now_playing(&mut events);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].title, "");
        assert!(!emitted[0].is_playing);
    }

    #[tokio::test]
    async fn stop_hint_overrides_running_backend() {
        let (backend, factory) = single_backend();
        backend.set_playing("Song A", 200.0, 10.0);

        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);
        let now = Instant::now();

        sync.refresh(RefreshHint::default(), now).await;
        assert_eq!(sync.state().track.title, "Song A");

        sync.refresh(RefreshHint::STOPPED, now + Duration::from_secs(1))
            .await;
        assert!(sync.state().is_idle());
        assert_eq!(sync.estimate(now + Duration::from_secs(2)), 0.0);
    }

    #[tokio::test]
    async fn repeated_refresh_with_unchanged_data_does_not_drift() {
        let (backend, factory) = single_backend();
        backend.set_playing("Song A", 200.0, 10.0);

        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);
        let mut events = sync.subscribe();
        let now = Instant::now();

        sync.refresh(RefreshHint::default(), now).await;
        let first_track = sync.state().track.clone();

        sync.refresh(RefreshHint::default(), now + Duration::from_secs(1))
            .await;

        assert_eq!(sync.state().track, first_track);
        assert_eq!(sync.state().last_observed_position, 10.0);
        assert!(sync.state().is_playing);

        let emitted = drain_now_playing(&mut events);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0], emitted[1]);
    }

    #[tokio::test]
    async fn optimistic_seek_updates_estimate_immediately() {
        let (backend, factory) = single_backend();
        backend.set_playing("Song A", 200.0, 10.0);

        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);
        let now = Instant::now();

        sync.refresh(RefreshHint::default(), now).await;
        sync.seek(120.0, now).await;

        assert!((sync.estimate(now) - 120.0).abs() < 1e-6);
        // Backend still reports the old position; the estimate must not
        // snap back until a real read says otherwise.
        assert_eq!(backend.seeks(), vec![120.0]);
        assert_eq!(backend.state.lock().unwrap().position, 10.0);
    }

    #[tokio::test]
    async fn inline_artwork_applies_synchronously() {
        let (backend, factory) = single_backend();
        backend.set_playing("Song A", 200.0, 0.0);
        backend.set_artwork(ArtworkRef::Inline(vec![0xFF, 0xD8]));

        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);

        sync.refresh(RefreshHint::default(), Instant::now()).await;

        assert_eq!(sync.state().track.artwork, Some(vec![0xFF, 0xD8]));
    }

    #[tokio::test]
    async fn remote_artwork_arrives_as_partial_update() {
        let (backend, factory) = single_backend();
        backend.set_playing("Song A", 200.0, 0.0);
        backend.set_artwork(ArtworkRef::Remote(
            Url::parse("https://covers.example/a.jpg").unwrap(),
        ));

        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx)
            .with_artwork_fetcher(Arc::new(StubFetcher {
                bytes: vec![1, 2, 3],
            }));

        sync.refresh(RefreshHint::default(), Instant::now()).await;
        // Text fields are committed before any artwork exists.
        assert_eq!(sync.state().track.title, "Song A");
        assert_eq!(sync.state().track.artwork, None);

        let follow_up = rx.recv().await.expect("artwork follow-up");
        sync.apply_follow_up(follow_up);
        assert_eq!(sync.state().track.artwork, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn source_switch_discards_stale_artwork() {
        let spotify = MockBackend::default();
        spotify.set_playing("Song A", 200.0, 0.0);
        spotify.set_artwork(ArtworkRef::Remote(
            Url::parse("https://covers.example/a.jpg").unwrap(),
        ));
        let music = MockBackend::default();
        music.set_playing("Song B", 100.0, 0.0);

        let mut backends = HashMap::new();
        backends.insert(SourceId::Spotify, spotify);
        backends.insert(SourceId::AppleMusic, music);
        let factory = factory_for(backends);

        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx)
            .with_artwork_fetcher(Arc::new(StubFetcher {
                bytes: vec![9, 9, 9],
            }));
        let now = Instant::now();

        sync.refresh(RefreshHint::default(), now).await;
        let stale = rx.recv().await.expect("stale artwork follow-up");

        sync.switch_source(SourceId::AppleMusic, now + Duration::from_secs(1))
            .await;
        assert_eq!(sync.state().track.title, "Song B");

        sync.apply_follow_up(stale);
        assert_eq!(sync.state().track.artwork, None);
    }

    #[tokio::test]
    async fn scenario_idle_then_play_then_seek() {
        let (backend, factory) = single_backend();
        let (tx, _rx) = mpsc::channel(8);
        let mut sync = Synchronizer::new(SourceId::Spotify, factory, tx);
        let t0 = Instant::now();

        sync.refresh(RefreshHint::default(), t0).await;
        assert!(sync.state().is_idle());

        backend.set_playing("Song A", 200.0, 10.0);
        sync.refresh(RefreshHint::default(), t0).await;
        assert_eq!(sync.state().track.title, "Song A");
        assert!(sync.state().is_playing);
        assert!((sync.estimate(t0) - 10.0).abs() < 1e-6);

        let t5 = t0 + Duration::from_secs(5);
        assert!((sync.estimate(t5) - 15.0).abs() < 1e-6);

        sync.seek(50.0, t5).await;
        assert!((sync.estimate(t5) - 50.0).abs() < 1e-6);
    }
}
