use nowbar_core::SourceId;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// A loosely-typed OS broadcast as delivered by the system playback
/// notification channel: a name plus an optional payload map.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub name: String,
    pub user_info: Option<Value>,
}

/// Normalized signal that playback may have changed. This is the only shape
/// that crosses into the synchronizer; the payload map never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshHint {
    pub reported_stopped: bool,
}

impl RefreshHint {
    pub const STOPPED: RefreshHint = RefreshHint {
        reported_stopped: true,
    };

    /// Parses a payload at the boundary. The only key that matters is
    /// "Player State", whose value "Stopped" is the stop sentinel; any other
    /// content, or no payload at all, means a plain refresh request.
    pub fn from_user_info(user_info: Option<&Value>) -> Self {
        let reported_stopped = user_info
            .and_then(|v| v.get("Player State"))
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("stopped"))
            .unwrap_or(false);
        Self { reported_stopped }
    }
}

/// Bridges push-style broadcasts into a single hint stream, filtered to the
/// active backend's channel. Rebinding on a source switch drops the old
/// subscription and forces an immediate refresh of the new one.
pub struct ChangeNotifier {
    active: SourceId,
    tx: mpsc::Sender<RefreshHint>,
}

impl ChangeNotifier {
    pub fn new(active: SourceId) -> (Self, mpsc::Receiver<RefreshHint>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { active, tx }, rx)
    }

    pub fn active(&self) -> SourceId {
        self.active
    }

    /// Extra producer handle for drivers that synthesize hints (the poll
    /// watcher) so all refresh requests merge into one stream.
    pub fn sender(&self) -> mpsc::Sender<RefreshHint> {
        self.tx.clone()
    }

    /// Feeds one raw broadcast through the filter; returns whether it was
    /// accepted for the active source. A full channel drops the hint:
    /// refreshes are idempotent, so losing a duplicate is harmless.
    pub fn ingest(&self, raw: &RawNotification) -> bool {
        if raw.name != self.active.notification_channel() {
            return false;
        }
        let hint = RefreshHint::from_user_info(raw.user_info.as_ref());
        if self.tx.try_send(hint).is_err() {
            debug!(channel = %raw.name, "hint channel full, dropping duplicate");
        }
        true
    }

    pub fn rebind(&mut self, source: SourceId) {
        self.active = source;
        let _ = self.tx.try_send(RefreshHint::default());
    }
}
