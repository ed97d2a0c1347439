//! Value types shared between the editing surface and the sync engine.

use web_time::SystemTime;

/// Immutable snapshot of the document text as produced by the editing surface.
///
/// Snapshots are replaced wholesale on every edit, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentSnapshot {
    /// Full document text.
    pub text: String,
    /// When the snapshot was taken, in milliseconds since the unix epoch.
    pub timestamp: i64,
}

impl DocumentSnapshot {
    /// Snapshot `text`, stamped with the current wall clock.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: now_millis(),
        }
    }

    pub fn with_timestamp(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
