//! In-memory session transcript with live fan-out.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Bounded ring buffer over one session's output.
///
/// Captured lines are retained in a ring holding the most recent
/// [`Transcript::RETAINED_LINE_LIMIT`] entries; once full, the oldest line
/// is dropped for each new one, so a chatty long-running agent cannot grow
/// the buffer without bound. Every line is also fanned out on a bounded
/// broadcast channel for live viewers; a slow subscriber may observe
/// [`broadcast::error::RecvError::Lagged`] and should fall back to
/// [`Transcript::snapshot`].
#[derive(Debug)]
pub struct Transcript {
    lines: Mutex<VecDeque<String>>,
    feed: broadcast::Sender<String>,
}

impl Transcript {
    /// Maximum number of lines retained for inspection.
    pub const RETAINED_LINE_LIMIT: usize = 10_000;

    /// Creates a transcript whose live feed buffers `capacity` lines per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity);
        Self {
            lines: Mutex::new(VecDeque::new()),
            feed,
        }
    }

    /// Appends one output line, dropping the oldest retained line when the
    /// ring is full, and fans it out to live subscribers.
    pub fn append(&self, line: impl Into<String>) {
        let entry = line.into();
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == Self::RETAINED_LINE_LIMIT {
                lines.pop_front();
            }
            lines.push_back(entry.clone());
        }
        // Send fails only when no live subscriber exists.
        drop(self.feed.send(entry));
    }

    /// Returns a copy of the retained lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .map_or_else(|_| Vec::new(), |lines| lines.iter().cloned().collect())
    }

    /// Returns the most recent line, if any.
    #[must_use]
    pub fn last_line(&self) -> Option<String> {
        self.lines
            .lock()
            .ok()
            .and_then(|lines| lines.back().cloned())
    }

    /// Subscribes to the live output feed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.feed.subscribe()
    }

    /// Returns the number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().map_or(0, |lines| lines.len())
    }

    /// Returns `true` when no output has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(256)
    }
}
