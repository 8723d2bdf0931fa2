use nowbar_sync::StateEvent;
use tracing::debug;

/// Text presentation surface: renders the `{title} • {artist}` line the way
/// the status item shows it, middle-truncated to a character budget.
pub struct StatusLine {
    width: usize,
    last: Option<String>,
}

impl StatusLine {
    pub fn new(width: usize) -> Self {
        Self { width, last: None }
    }

    pub fn render(&mut self, event: &StateEvent) {
        match event {
            StateEvent::NowPlaying(np) => {
                let line = if np.title.is_empty() && np.artist.is_empty() {
                    "Nothing playing".to_string()
                } else {
                    let marker = if np.is_playing { "▶" } else { "⏸" };
                    truncate_middle(&format!("{marker} {} • {}", np.title, np.artist), self.width)
                };
                if self.last.as_deref() != Some(line.as_str()) {
                    println!("{line}");
                    self.last = Some(line);
                }
            }
            StateEvent::Position { position, duration } => {
                debug!(
                    position = %format_seconds(*position),
                    duration = %format_seconds(*duration),
                    "seek position"
                );
            }
            StateEvent::Artwork(bytes) => {
                debug!(
                    bytes = bytes.as_ref().map(Vec::len).unwrap_or(0),
                    "artwork updated"
                );
            }
            StateEvent::Lyrics(text) => {
                debug!(available = text.is_some(), "lyrics updated");
            }
        }
    }
}

/// Middle truncation with an ellipsis, so both the start of the title and
/// the artist stay readable in a narrow surface.
pub fn truncate_middle(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let keep = max_chars - 1;
    let front = keep.div_ceil(2);
    let back = keep / 2;
    let mut out: String = chars[..front].iter().collect();
    out.push('…');
    out.extend(&chars[chars.len() - back..]);
    out
}

/// `m:ss` display, `h:mm:ss` past the hour.
pub fn format_seconds(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
