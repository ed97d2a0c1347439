//! Remote collaborator cursors and the local caret.
//!
//! The transport owns the map of remote cursors; this module only reads it.
//! Raw offsets in that map refer to whatever text the collaborator had when
//! they broadcast. While our own text changes underneath them, we carry each
//! cursor along by remapping its last adjusted offset through the edit.

use std::collections::HashMap;

use quire_common::ClientId;
use quire_common::transport::RemoteCursor;
use smol_str::SmolStr;

use crate::color::color_for_client;
use crate::platform::{CaretPosition, Edge, MeasureOffset};
use crate::remap::remap;

/// A remote cursor with its offset adjusted to the local text.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedCursor {
    pub client_id: ClientId,
    pub username: SmolStr,
    /// Character offset in the local text.
    pub offset: usize,
    /// Packed `0xRRGGBBAA` colour.
    pub color: u32,
}

/// A tracked cursor with its on-screen position.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorOverlay {
    pub cursor: TrackedCursor,
    pub position: CaretPosition,
}

/// Keeps remote cursor offsets and the local caret valid across text changes.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    adjusted: HashMap<ClientId, usize>,
    last_text: Option<String>,
    local_offset: usize,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the current text and remote cursor map.
    ///
    /// The first observation seeds the adjusted offsets from the raw ones. On
    /// later observations an unchanged text re-syncs from the raw offsets,
    /// while a changed text remaps every previously adjusted offset (or the
    /// raw one, for cursors seen for the first time) from the old text to the
    /// new one. Cursors missing from `remote` are dropped.
    pub fn observe(
        &mut self,
        text: &str,
        remote: &HashMap<ClientId, RemoteCursor>,
    ) -> Vec<TrackedCursor> {
        let len = text.chars().count();

        match self.last_text.as_deref() {
            Some(previous) if previous != text => {
                let mut adjusted = HashMap::with_capacity(remote.len());
                for (id, cursor) in remote {
                    let from = self.adjusted.get(id).copied().unwrap_or(cursor.offset);
                    adjusted.insert(id.clone(), remap(previous, text, from));
                }
                tracing::trace!(cursors = adjusted.len(), "remapped remote cursors");
                self.adjusted = adjusted;
            }
            _ => {
                // First observation or unchanged text: trust the raw offsets.
                self.adjusted = remote
                    .iter()
                    .map(|(id, cursor)| (id.clone(), cursor.offset.min(len)))
                    .collect();
            }
        }

        self.last_text = Some(text.to_owned());
        self.cursors(remote)
    }

    /// Tracked cursors for everything in `remote`, sorted by client id.
    pub fn cursors(&self, remote: &HashMap<ClientId, RemoteCursor>) -> Vec<TrackedCursor> {
        let mut cursors: Vec<TrackedCursor> = remote
            .values()
            .filter_map(|cursor| {
                let offset = *self.adjusted.get(&cursor.client_id)?;
                Some(TrackedCursor {
                    client_id: cursor.client_id.clone(),
                    username: cursor.username.clone(),
                    offset,
                    color: color_for_client(&cursor.client_id),
                })
            })
            .collect();
        cursors.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        cursors
    }

    /// Adjusted offset of a remote cursor, if it's being tracked.
    pub fn adjusted_offset(&self, client_id: &ClientId) -> Option<usize> {
        self.adjusted.get(client_id).copied()
    }

    /// Local caret offset.
    pub fn local_offset(&self) -> usize {
        self.local_offset
    }

    pub fn set_local_offset(&mut self, offset: usize) {
        self.local_offset = offset;
    }

    /// Carry the local caret across a text replacement it did not cause.
    pub fn remap_local(&mut self, old_text: &str, new_text: &str) -> usize {
        self.local_offset = remap(old_text, new_text, self.local_offset);
        self.local_offset
    }
}

/// Resolve screen positions for tracked cursors.
///
/// Offset 0 and an empty text anchor to the start of the container. An offset
/// the surface cannot measure (typically one past the rendered end) anchors
/// to its end.
pub fn overlays<M: MeasureOffset>(
    text: &str,
    cursors: &[TrackedCursor],
    measure: &M,
) -> Vec<CursorOverlay> {
    cursors
        .iter()
        .map(|cursor| {
            let position = if cursor.offset == 0 || text.is_empty() {
                measure.origin(Edge::Start)
            } else {
                measure
                    .measure(cursor.offset)
                    .unwrap_or_else(|| measure.origin(Edge::End))
            };
            CursorOverlay {
                cursor: cursor.clone(),
                position,
            }
        })
        .collect()
}
