//! Error types for the sync engine.
//!
//! None of these are fatal to a session: the session logs them, adjusts its
//! status and carries on.

use miette::Diagnostic;
use quire_common::storage::StorageError;
use quire_common::transport::WireError;
use quire_common::DocumentId;
use smol_str::SmolStr;

/// Main error type for synchronization operations
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SyncError {
    /// Broadcasting to the room failed
    #[error("transport failure: {0}")]
    #[diagnostic(
        code(quire::sync::transport),
        help("the session recovers once the transport reconnects")
    )]
    Transport(SmolStr),

    /// A persistence call failed
    #[error("persistence failure: {0}")]
    #[diagnostic(code(quire::sync::persistence))]
    Persistence(SmolStr),

    /// The document does not exist remotely
    #[error("document {0} not found")]
    #[diagnostic(code(quire::sync::not_found))]
    NotFound(DocumentId),

    /// The connectivity probe failed before a network action
    #[error("offline")]
    #[diagnostic(code(quire::sync::offline))]
    Offline,

    /// The session task has stopped
    #[error("session closed")]
    #[diagnostic(code(quire::sync::closed))]
    SessionClosed,

    /// Local storage error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    /// Wire codec error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Wire(#[from] WireError),
}

impl SyncError {
    pub fn transport(message: impl Into<SmolStr>) -> Self {
        Self::Transport(message.into())
    }

    pub fn persistence(message: impl Into<SmolStr>) -> Self {
        Self::Persistence(message.into())
    }
}
