//! In-process collaborators: a room hub, persistence and a connectivity switch.
//!
//! Used by the integration tests and the `quire-sim` binary. The hub passes
//! encoded bytes around exactly as a network transport would, so sessions go
//! through the real wire codec.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use quire_common::transport::{CollabMessage, PresenceTracker, ReceivedMessage, RemoteCursor};
use quire_common::{ClientId, DocumentId};
use quire_editor_core::now_millis;
use smol_str::{SmolStr, format_smolstr};
use web_time::Instant;

use crate::backend::{ConnectivityProbe, Persistence, RemoteSink, Transport};
use crate::document::{DocumentUpdate, EditableState, RemoteDocument};
use crate::error::SyncError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Member {
    sink: RemoteSink,
    presence: Arc<Mutex<PresenceTracker>>,
    connected: Arc<AtomicBool>,
}

impl Member {
    fn receive(&self, bytes: &[u8], decoded: Option<&ReceivedMessage>) {
        if !self.connected.load(Ordering::Acquire) {
            return;
        }
        if let Some(received) = decoded {
            lock(&self.presence).apply(received, Instant::now());
        }
        self.sink.deliver(bytes.to_vec());
    }
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<DocumentId, HashMap<ClientId, Member>>,
    log: Vec<(DocumentId, ReceivedMessage)>,
}

/// Routes room broadcasts between [`MemoryTransport`]s.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn join(&self, room: &DocumentId, client_id: &ClientId, member: Member) {
        lock(&self.state)
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(client_id.clone(), member);
    }

    fn leave(&self, room: &DocumentId, client_id: &ClientId) {
        let mut state = lock(&self.state);
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(client_id);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
    }

    fn broadcast(&self, room: &DocumentId, from: &ClientId, bytes: &[u8]) {
        let decoded = CollabMessage::decode(bytes).ok();
        let mut state = lock(&self.state);
        if let Some(received) = &decoded {
            state.log.push((room.clone(), received.clone()));
        }
        let Some(members) = state.rooms.get(room) else {
            return;
        };
        for (id, member) in members {
            if id != from {
                member.receive(bytes, decoded.as_ref());
            }
        }
    }

    /// Deliver raw bytes to every member of `room`, bypassing any sender.
    pub fn inject(&self, room: &DocumentId, bytes: &[u8]) {
        let decoded = CollabMessage::decode(bytes).ok();
        let state = lock(&self.state);
        if let Some(members) = state.rooms.get(room) {
            for member in members.values() {
                member.receive(bytes, decoded.as_ref());
            }
        }
    }

    /// Every message broadcast to `room` so far, oldest first.
    pub fn sent(&self, room: &DocumentId) -> Vec<ReceivedMessage> {
        lock(&self.state)
            .log
            .iter()
            .filter(|(r, _)| r == room)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Content broadcasts in `room`, as texts.
    pub fn sent_contents(&self, room: &DocumentId) -> Vec<String> {
        self.sent(room)
            .into_iter()
            .filter_map(|received| match received.message {
                CollabMessage::Content { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn members(&self, room: &DocumentId) -> Vec<ClientId> {
        let mut members: Vec<ClientId> = lock(&self.state)
            .rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}

/// A [`Transport`] over a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    client_id: ClientId,
    username: SmolStr,
    room: Mutex<Option<DocumentId>>,
    presence: Arc<Mutex<PresenceTracker>>,
    connected: Arc<AtomicBool>,
    stale_after: Duration,
}

impl MemoryTransport {
    pub fn new(hub: &MemoryHub, client_id: impl Into<ClientId>, username: impl Into<SmolStr>) -> Self {
        Self {
            hub: hub.clone(),
            client_id: client_id.into(),
            username: username.into(),
            room: Mutex::new(None),
            presence: Arc::new(Mutex::new(PresenceTracker::new())),
            connected: Arc::new(AtomicBool::new(true)),
            stale_after: Duration::from_secs(30),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Simulate losing or regaining the connection.
    ///
    /// While disconnected nothing is sent or received.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    fn send(&self, message: CollabMessage) -> Result<(), SyncError> {
        if !self.is_connected() {
            return Err(SyncError::transport("disconnected"));
        }
        let room = lock(&self.room)
            .clone()
            .ok_or_else(|| SyncError::transport("not joined"))?;
        let bytes = message.encode(&self.client_id)?;
        self.hub.broadcast(&room, &self.client_id, &bytes);
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn client_id(&self) -> ClientId {
        self.client_id.clone()
    }

    async fn join(&self, room: &DocumentId, sink: RemoteSink) -> Result<(), SyncError> {
        self.hub.join(
            room,
            &self.client_id,
            Member {
                sink,
                presence: self.presence.clone(),
                connected: self.connected.clone(),
            },
        );
        *lock(&self.room) = Some(room.clone());
        tracing::debug!(client_id = %self.client_id, %room, "joined room");
        self.send(CollabMessage::Join {
            username: self.username.clone(),
        })
    }

    async fn leave(&self) -> Result<(), SyncError> {
        // Say goodbye before dropping out of the room; a failed send is fine.
        let _ = self.send(CollabMessage::Leave);
        let room = lock(&self.room).take();
        if let Some(room) = room {
            self.hub.leave(&room, &self.client_id);
            lock(&self.presence).clear();
        }
        Ok(())
    }

    async fn emit_change(&self, text: &str) -> Result<(), SyncError> {
        self.send(CollabMessage::Content {
            text: text.to_owned(),
        })
    }

    async fn broadcast_cursor(&self, offset: usize, username: &str) -> Result<(), SyncError> {
        self.send(CollabMessage::Cursor {
            offset,
            username: username.into(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn remote_cursors(&self) -> HashMap<ClientId, RemoteCursor> {
        let mut presence = lock(&self.presence);
        presence.prune_stale(Instant::now(), self.stale_after);
        presence.snapshot()
    }
}

#[derive(Default)]
struct Documents {
    documents: HashMap<DocumentId, RemoteDocument>,
    saves: Vec<(DocumentId, DocumentUpdate)>,
    next_id: u64,
}

/// A [`Persistence`] backed by a map, with switchable failures and latency.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<Documents>,
    fail_fetch: AtomicBool,
    fail_save: AtomicBool,
    fail_create: AtomicBool,
    save_delay_ms: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` under `id`, as if someone had saved it.
    pub fn insert(&self, id: &DocumentId, state: EditableState) {
        let document = RemoteDocument {
            id: id.clone(),
            title: state.title,
            content: state.content,
            tags: state.tags,
            updated_at: now_millis(),
        };
        lock(&self.state).documents.insert(id.clone(), document);
    }

    pub fn get(&self, id: &DocumentId) -> Option<RemoteDocument> {
        lock(&self.state).documents.get(id).cloned()
    }

    pub fn document_count(&self) -> usize {
        lock(&self.state).documents.len()
    }

    /// Every successful save, oldest first.
    pub fn saves(&self) -> Vec<(DocumentId, DocumentUpdate)> {
        lock(&self.state).saves.clone()
    }

    pub fn save_count(&self) -> usize {
        lock(&self.state).saves.len()
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::Release);
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::Release);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::Release);
    }

    /// Make every save take `delay` before it completes.
    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }
}

impl Persistence for MemoryPersistence {
    async fn fetch_document(&self, id: &DocumentId) -> Result<RemoteDocument, SyncError> {
        if self.fail_fetch.load(Ordering::Acquire) {
            return Err(SyncError::persistence("fetch failed"));
        }
        self.get(id).ok_or_else(|| SyncError::NotFound(id.clone()))
    }

    async fn save_document(&self, id: &DocumentId, update: DocumentUpdate) -> Result<(), SyncError> {
        let delay = self.save_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_save.load(Ordering::Acquire) {
            return Err(SyncError::persistence("save failed"));
        }

        let mut state = lock(&self.state);
        let Some(document) = state.documents.get_mut(id) else {
            return Err(SyncError::NotFound(id.clone()));
        };
        document.title = update.title.clone();
        document.content = update.content.clone();
        document.tags = update.tags.clone();
        document.updated_at = now_millis();
        state.saves.push((id.clone(), update));
        Ok(())
    }

    async fn create_document(&self, update: DocumentUpdate) -> Result<DocumentId, SyncError> {
        if self.fail_create.load(Ordering::Acquire) {
            return Err(SyncError::persistence("create failed"));
        }

        let mut state = lock(&self.state);
        let id = loop {
            state.next_id += 1;
            let candidate = format_smolstr!("doc-{}", state.next_id);
            if !state.documents.contains_key(&candidate) {
                break candidate;
            }
        };
        state.documents.insert(
            id.clone(),
            RemoteDocument {
                id: id.clone(),
                title: update.title,
                content: update.content,
                tags: update.tags,
                updated_at: now_millis(),
            },
        );
        Ok(id)
    }
}

/// A [`ConnectivityProbe`] that reports whatever it was last told.
#[derive(Debug)]
pub struct SwitchConnectivity {
    online: AtomicBool,
}

impl SwitchConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

impl Default for SwitchConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for SwitchConnectivity {
    async fn check(&self) -> bool {
        self.is_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let persistence = MemoryPersistence::new();
        let id = DocumentId::from("doc-1");
        persistence.insert(&id, EditableState::new("T", "one"));

        persistence
            .save_document(&id, EditableState::new("T", "two").into())
            .await
            .unwrap();
        assert_eq!(persistence.fetch_document(&id).await.unwrap().content, "two");
        assert_eq!(persistence.save_count(), 1);

        let created = persistence
            .create_document(EditableState::new("Copy", "three").into())
            .await
            .unwrap();
        // Ids never collide with documents that were inserted by hand.
        assert_ne!(created, id);
        assert_eq!(persistence.document_count(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failures() {
        let persistence = MemoryPersistence::new();
        let id = DocumentId::from("doc-1");
        assert!(matches!(
            persistence.fetch_document(&id).await,
            Err(SyncError::NotFound(_))
        ));

        persistence.insert(&id, EditableState::new("T", "one"));
        persistence.fail_save(true);
        assert!(
            persistence
                .save_document(&id, EditableState::new("T", "two").into())
                .await
                .is_err()
        );
        assert_eq!(persistence.get(&id).unwrap().content, "one");
    }

    #[tokio::test]
    async fn test_switch_connectivity() {
        let probe = SwitchConnectivity::default();
        assert!(probe.check().await);
        probe.set_online(false);
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn test_transport_requires_join_and_connection() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(&hub, "a", "Alice");
        assert!(matches!(
            transport.emit_change("x").await,
            Err(SyncError::Transport(_))
        ));
        assert!(transport.remote_cursors().is_empty());
    }
}
