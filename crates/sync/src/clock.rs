use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Clamps a reported position to something displayable: finite and
/// non-negative.
pub fn sanitize_position(position: f64) -> f64 {
    if position.is_finite() && position > 0.0 {
        position
    } else {
        0.0
    }
}

/// Local interpolator producing a smooth position estimate between real
/// observations, so the display does not need a backend query per frame.
///
/// The anchor pair is only ever set from a real read (or an optimistic user
/// seek); estimates are derived and never written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionClock {
    anchor_position: f64,
    anchor_at: Option<Instant>,
}

impl PositionClock {
    /// Anchors to an observed position. While playing the estimate advances
    /// from this moment; while paused it stays put.
    pub fn observe(&mut self, position: f64, now: Instant, playing: bool) {
        self.anchor_position = sanitize_position(position);
        self.anchor_at = playing.then_some(now);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Position estimate at `now`, clamped to `[0, duration]`. A missing or
    /// zero duration yields `0.0` so ratio consumers never divide by zero.
    pub fn estimate(&self, now: Instant, duration: f64) -> f64 {
        if !(duration > 0.0) {
            return 0.0;
        }
        let raw = match self.anchor_at {
            Some(at) => self.anchor_position + now.duration_since(at).as_secs_f64(),
            None => self.anchor_position,
        };
        raw.clamp(0.0, duration)
    }
}

/// Periodic driver for position re-emission. Started while a display surface
/// is visible, paused while hidden or while the user drags a seek control.
pub struct SeekTicker {
    cadence: Duration,
    task: Option<JoinHandle<()>>,
}

impl SeekTicker {
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Begins ticking into `tx`; a no-op when already running.
    pub fn start(&mut self, tx: mpsc::Sender<()>) {
        if self.is_running() {
            return;
        }
        let cadence = self.cadence;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        }));
    }

    pub fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SeekTicker {
    fn drop(&mut self) {
        self.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_position, PositionClock, SeekTicker};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    #[test]
    fn estimate_advances_with_wall_clock_while_playing() {
        let mut clock = PositionClock::default();
        let t0 = Instant::now();
        clock.observe(10.0, t0, true);

        let e1 = clock.estimate(t0 + Duration::from_secs(2), 200.0);
        let e2 = clock.estimate(t0 + Duration::from_secs(5), 200.0);

        assert!((e1 - 12.0).abs() < 1e-6);
        assert!((e2 - 15.0).abs() < 1e-6);
        assert!(e2 >= e1);
    }

    #[test]
    fn estimate_frozen_while_paused() {
        let mut clock = PositionClock::default();
        let t0 = Instant::now();
        clock.observe(42.0, t0, false);

        assert_eq!(clock.estimate(t0 + Duration::from_secs(60), 200.0), 42.0);
        assert_eq!(clock.estimate(t0 + Duration::from_secs(3600), 200.0), 42.0);
    }

    #[test]
    fn estimate_clamps_at_duration() {
        let mut clock = PositionClock::default();
        let t0 = Instant::now();
        clock.observe(195.0, t0, true);

        assert_eq!(clock.estimate(t0 + Duration::from_secs(30), 200.0), 200.0);
    }

    #[test]
    fn zero_duration_estimates_zero() {
        let mut clock = PositionClock::default();
        let t0 = Instant::now();
        clock.observe(15.0, t0, true);

        assert_eq!(clock.estimate(t0 + Duration::from_secs(1), 0.0), 0.0);
        assert_eq!(clock.estimate(t0 + Duration::from_secs(1), -1.0), 0.0);
    }

    #[test]
    fn observations_are_sanitized() {
        assert_eq!(sanitize_position(f64::NAN), 0.0);
        assert_eq!(sanitize_position(-3.0), 0.0);
        assert_eq!(sanitize_position(12.5), 12.5);

        let mut clock = PositionClock::default();
        let t0 = Instant::now();
        clock.observe(f64::NAN, t0, false);
        assert_eq!(clock.estimate(t0, 100.0), 0.0);
    }

    #[tokio::test]
    async fn ticker_start_is_idempotent_and_pause_stops_it() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut ticker = SeekTicker::new(Duration::from_millis(10));

        ticker.start(tx.clone());
        assert!(ticker.is_running());
        ticker.start(tx);
        assert!(ticker.is_running());

        assert!(rx.recv().await.is_some());

        ticker.pause();
        assert!(!ticker.is_running());
    }
}
