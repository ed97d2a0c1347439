//! Presence tracking for collaborative editing sessions.
//!
//! The transport owns one [`PresenceTracker`] per room. It records the last
//! cursor broadcast of every other collaborator; editor code only ever reads
//! snapshots of it.

use std::collections::HashMap;
use std::time::Duration;

use smol_str::SmolStr;
use web_time::Instant;

use super::{CollabMessage, ReceivedMessage};
use crate::ClientId;

/// A remote collaborator's last known cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    /// The collaborator's client id.
    pub client_id: ClientId,
    /// Display name for the cursor label.
    pub username: SmolStr,
    /// Character offset in the collaborator's text.
    pub offset: usize,
    /// When this cursor was last updated.
    pub last_update: Instant,
}

/// Tracks the cursors of everyone else in a room.
#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    cursors: HashMap<ClientId, RemoteCursor>,
}

impl PresenceTracker {
    /// Create a new presence tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cursor broadcast. The first broadcast of a client creates its entry.
    pub fn update_cursor(
        &mut self,
        client_id: &ClientId,
        username: SmolStr,
        offset: usize,
        now: Instant,
    ) {
        self.cursors
            .entry(client_id.clone())
            .and_modify(|cursor| {
                cursor.username = username.clone();
                cursor.offset = offset;
                cursor.last_update = now;
            })
            .or_insert_with(|| RemoteCursor {
                client_id: client_id.clone(),
                username,
                offset,
                last_update: now,
            });
    }

    /// Remove a collaborator when they leave.
    pub fn remove(&mut self, client_id: &ClientId) -> Option<RemoteCursor> {
        self.cursors.remove(client_id)
    }

    /// Fold a received room message into the map.
    ///
    /// Returns true if the map changed.
    pub fn apply(&mut self, received: &ReceivedMessage, now: Instant) -> bool {
        match &received.message {
            CollabMessage::Cursor { offset, username } => {
                self.update_cursor(&received.from, username.clone(), *offset, now);
                true
            }
            CollabMessage::Leave => self.remove(&received.from).is_some(),
            CollabMessage::Content { .. } | CollabMessage::Join { .. } => false,
        }
    }

    /// Remove cursors that haven't been updated within `max_age`.
    ///
    /// Returns the removed client ids.
    pub fn prune_stale(&mut self, now: Instant, max_age: Duration) -> Vec<ClientId> {
        let stale: Vec<ClientId> = self
            .cursors
            .values()
            .filter(|c| now.saturating_duration_since(c.last_update) > max_age)
            .map(|c| c.client_id.clone())
            .collect();
        for id in &stale {
            tracing::debug!(client_id = %id, "pruning stale remote cursor");
            self.cursors.remove(id);
        }
        stale
    }

    /// Forget every cursor, e.g. after leaving the room.
    pub fn clear(&mut self) {
        self.cursors.clear();
    }

    /// Get a cursor by client id.
    pub fn get(&self, client_id: &ClientId) -> Option<&RemoteCursor> {
        self.cursors.get(client_id)
    }

    /// All remote cursors.
    pub fn cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    /// Owned copy of the cursor map, for handing to readers.
    pub fn snapshot(&self) -> HashMap<ClientId, RemoteCursor> {
        self.cursors.clone()
    }

    /// Number of tracked cursors.
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Check if there are no cursors.
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(from: &str, message: CollabMessage) -> ReceivedMessage {
        ReceivedMessage {
            from: from.into(),
            timestamp: 0,
            message,
        }
    }

    #[test]
    fn test_cursor_broadcast_creates_then_updates() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();

        let changed = tracker.apply(
            &received(
                "c1",
                CollabMessage::Cursor {
                    offset: 3,
                    username: "Alice".into(),
                },
            ),
            now,
        );
        assert!(changed);
        assert_eq!(tracker.len(), 1);

        tracker.apply(
            &received(
                "c1",
                CollabMessage::Cursor {
                    offset: 9,
                    username: "Alice".into(),
                },
            ),
            now + Duration::from_secs(1),
        );
        let cursor = tracker.get(&"c1".into()).unwrap();
        assert_eq!(cursor.offset, 9);
        assert_eq!(cursor.last_update, now + Duration::from_secs(1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_leave_removes_cursor() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();
        tracker.update_cursor(&"c1".into(), "Alice".into(), 0, now);

        assert!(tracker.apply(&received("c1", CollabMessage::Leave), now));
        assert!(tracker.is_empty());
        // Content never touches presence.
        assert!(!tracker.apply(
            &received("c2", CollabMessage::Content { text: "x".into() }),
            now
        ));
    }

    #[test]
    fn test_prune_stale_cursors() {
        let mut tracker = PresenceTracker::new();
        let start = Instant::now();
        tracker.update_cursor(&"old".into(), "Old".into(), 1, start);
        tracker.update_cursor(
            &"fresh".into(),
            "Fresh".into(),
            2,
            start + Duration::from_secs(25),
        );

        let pruned = tracker.prune_stale(start + Duration::from_secs(31), Duration::from_secs(30));
        assert_eq!(pruned, vec![ClientId::from("old")]);
        assert!(tracker.get(&"fresh".into()).is_some());
    }
}
