#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quire_common::storage::MemoryStorage;
use quire_common::{DocumentId, SyncConfig};
use quire_editor_core::CommandBus;
use quire_sync::memory::{MemoryHub, MemoryPersistence, MemoryTransport, SwitchConnectivity};
use quire_sync::{
    Collaborators, DocumentSession, EditableState, FlushRegistry, SessionEvent, SessionHandle,
    SessionOptions, SyncStatus,
};

pub const DOC: &str = "doc-1";

/// Shared backends for one or more sessions on the same document.
pub struct Harness {
    pub id: DocumentId,
    pub hub: MemoryHub,
    pub persistence: Arc<MemoryPersistence>,
    pub storage: Arc<MemoryStorage>,
    pub registry: FlushRegistry,
    pub commands: CommandBus,
    pub config: SyncConfig,
}

pub struct Peer {
    pub handle: SessionHandle,
    pub transport: Arc<MemoryTransport>,
    pub connectivity: Arc<SwitchConnectivity>,
}

impl Peer {
    /// Cut the network and tell the session about it.
    pub fn go_offline(&self) {
        self.connectivity.set_online(false);
        self.transport.set_connected(false);
        self.handle.set_online(false).unwrap();
    }

    pub fn go_online(&self) {
        self.connectivity.set_online(true);
        self.transport.set_connected(true);
        self.handle.set_online(true).unwrap();
    }
}

impl Harness {
    pub fn new(initial: EditableState) -> Self {
        let id = DocumentId::new_static(DOC);
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.insert(&id, initial);
        Self {
            id,
            hub: MemoryHub::new(),
            persistence,
            storage: Arc::new(MemoryStorage::new()),
            registry: FlushRegistry::new(),
            commands: CommandBus::new(),
            config: SyncConfig::default(),
        }
    }

    /// Open a session from the current persisted state and let it mount.
    pub async fn open(&self, name: &str) -> Peer {
        let initial = self.persistence.get(&self.id).unwrap().state();
        let transport = Arc::new(MemoryTransport::new(&self.hub, name, name));
        let connectivity = Arc::new(SwitchConnectivity::default());
        let handle = DocumentSession::spawn(
            self.id.clone(),
            initial,
            Collaborators {
                transport: transport.clone(),
                persistence: self.persistence.clone(),
                connectivity: connectivity.clone(),
                storage: self.storage.clone(),
            },
            SessionOptions {
                username: name.into(),
                config: self.config.clone(),
                flush_registry: self.registry.clone(),
                commands: self.commands.clone(),
            },
        );
        tick().await;
        Peer {
            handle,
            transport,
            connectivity,
        }
    }

    pub fn persisted_content(&self) -> String {
        self.persistence.get(&self.id).unwrap().content
    }
}

/// Let spawned tasks run without moving past any session deadline.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn statuses(events: &[SessionEvent]) -> Vec<SyncStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Status(status) => Some(*status),
            _ => None,
        })
        .collect()
}

pub fn applied(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::ApplyContent(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
