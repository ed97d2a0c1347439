//! The collaborators a session talks to.
//!
//! A session only ever sees these traits. Real deployments back them with a
//! websocket room and an HTTP API; [`crate::memory`] has in-process versions.

use std::collections::HashMap;
use std::future::Future;

use quire_common::transport::RemoteCursor;
use quire_common::{ClientId, DocumentId};
use tokio::sync::mpsc;

use crate::document::{DocumentUpdate, RemoteDocument};
use crate::error::SyncError;
use crate::session::SessionInput;

/// Broadcast channel for one document room.
///
/// Delivery is not assumed reliable: the session never waits for an
/// acknowledgement and tolerates lost or duplicated messages.
pub trait Transport: Send + Sync + 'static {
    /// This client's id in the room.
    fn client_id(&self) -> ClientId;

    /// Join `room`. Encoded messages from other members go to `sink`.
    fn join(
        &self,
        room: &DocumentId,
        sink: RemoteSink,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Leave the joined room.
    fn leave(&self) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Broadcast the full normalized text.
    fn emit_change(&self, text: &str) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Broadcast this client's caret.
    fn broadcast_cursor(
        &self,
        offset: usize,
        username: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn is_connected(&self) -> bool;

    /// Snapshot of the cursors of everyone else in the room.
    fn remote_cursors(&self) -> HashMap<ClientId, RemoteCursor>;
}

/// Durable remote storage of documents.
pub trait Persistence: Send + Sync + 'static {
    fn fetch_document(
        &self,
        id: &DocumentId,
    ) -> impl Future<Output = Result<RemoteDocument, SyncError>> + Send;

    fn save_document(
        &self,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Create a new document, returning its id.
    fn create_document(
        &self,
        update: DocumentUpdate,
    ) -> impl Future<Output = Result<DocumentId, SyncError>> + Send;
}

/// Cheap reachability check run before every network action.
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Where a transport delivers the raw payloads it receives for a session.
///
/// Holds only a weak reference to the session: a transport that outlives its
/// session just sees [`deliver`](Self::deliver) return false.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    inputs: mpsc::WeakUnboundedSender<SessionInput>,
}

impl RemoteSink {
    pub(crate) fn new(inputs: mpsc::WeakUnboundedSender<SessionInput>) -> Self {
        Self { inputs }
    }

    /// Hand an encoded message to the session. Returns false once the session is gone.
    pub fn deliver(&self, bytes: Vec<u8>) -> bool {
        match self.inputs.upgrade() {
            Some(inputs) => inputs.send(SessionInput::Remote(bytes)).is_ok(),
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.upgrade().is_none_or(|inputs| inputs.is_closed())
    }
}
