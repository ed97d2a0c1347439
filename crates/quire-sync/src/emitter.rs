//! Debounced change emission with local echo suppression.
//!
//! Local edits land here as full texts. Once input has been quiet for the emit
//! debounce window the latest text is normalized and, if it differs from the
//! last text emitted, handed back to the session for broadcast. The normalized
//! text is later applied to the local view as well (the "echo"), delayed by
//! the echo suppression window while connected so the broadcast goes out
//! before the view jumps. Typing again before the echo is due cancels it.
//!
//! The emitter does no I/O and never reads a clock; the session passes `now`.

use quire_common::TimingPolicy;
use quire_editor_core::normalize;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct PendingEcho {
    text: String,
    due: Instant,
}

#[derive(Debug, Clone)]
pub struct ChangeEmitter {
    timing: TimingPolicy,
    pending: Option<String>,
    emit_deadline: Option<Instant>,
    last_emitted: String,
    echo: Option<PendingEcho>,
}

impl ChangeEmitter {
    /// `initial` is the text the session starts from; it counts as emitted.
    pub fn new(timing: TimingPolicy, initial: &str) -> Self {
        Self {
            timing,
            pending: None,
            emit_deadline: None,
            last_emitted: normalize(initial).into_owned(),
            echo: None,
        }
    }

    /// Record a local edit, restarting the debounce.
    pub fn record_edit(&mut self, text: String, now: Instant) {
        self.pending = Some(text);
        self.emit_deadline = Some(now + self.timing.emit_debounce_window);
        if self.echo.take().is_some() {
            tracing::trace!("typed since emission, dropping echo");
        }
    }

    /// Earliest instant at which [`take_due_emit`](Self::take_due_emit) or
    /// [`take_due_echo`](Self::take_due_echo) has something to return.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.emit_deadline, self.echo.as_ref().map(|e| e.due)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take the pending text if its debounce has elapsed.
    ///
    /// Returns the normalized text if it differs from the last emission. The
    /// text then becomes the last emitted one.
    pub fn take_due_emit(&mut self, now: Instant) -> Option<String> {
        if self.emit_deadline.is_none_or(|deadline| deadline > now) {
            return None;
        }
        self.emit_deadline = None;
        let text = self.pending.take()?;

        let normalized = normalize(&text).into_owned();
        if normalized == self.last_emitted {
            tracing::trace!("normalized text unchanged, not emitting");
            return None;
        }
        self.last_emitted = normalized.clone();
        Some(normalized)
    }

    /// Schedule the local echo of an emitted text.
    ///
    /// While connected the echo waits out the suppression window and is
    /// returned later by [`take_due_echo`](Self::take_due_echo). Offline there
    /// is nothing to wait for: the text is handed straight back.
    pub fn schedule_echo(&mut self, text: String, now: Instant, connected: bool) -> Option<String> {
        if !connected {
            return Some(text);
        }
        self.echo = Some(PendingEcho {
            text,
            due: now + self.timing.echo_suppression_window,
        });
        None
    }

    /// Take the echo if it is due.
    pub fn take_due_echo(&mut self, now: Instant) -> Option<String> {
        if self.echo.as_ref().is_some_and(|echo| echo.due <= now) {
            self.echo.take().map(|echo| echo.text)
        } else {
            None
        }
    }

    /// Adopt a text that arrived from elsewhere as the last known good one.
    ///
    /// Drops any pending emission and echo: they were based on a text that
    /// has just been replaced.
    pub fn adopt(&mut self, text: &str) {
        self.pending = None;
        self.emit_deadline = None;
        self.echo = None;
        self.last_emitted = normalize(text).into_owned();
    }

    pub fn last_emitted(&self) -> &str {
        &self.last_emitted
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop all timers.
    pub fn clear(&mut self) {
        self.pending = None;
        self.emit_deadline = None;
        self.echo = None;
    }
}
