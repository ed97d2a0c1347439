//! quire-sync: keeps an open quire document in step with its collaborators
//! and its persisted copy.
//!
//! A [`DocumentSession`] is spawned per open document. It debounces local
//! edits into room broadcasts and saves, adopts remote text, tracks remote
//! cursors, and survives going offline by reconciling (or forking) on
//! reconnect.
//!
//! - `session`: the per-document reactor and its handle
//! - `status`: synchronized / saving / unsynchronized state machine
//! - `emitter`: debounced broadcasts and normalization echoes
//! - `flush`: single-slot flush registry for UI actions outside the editor
//! - `offline`: offline baselines, the local cache and reconciliation
//! - `backend`: traits for transport, persistence and connectivity
//! - `memory`: in-process backends for tests and simulation

pub mod backend;
pub mod document;
pub mod emitter;
pub mod error;
pub mod flush;
pub mod memory;
pub mod offline;
pub mod session;
pub mod status;

pub use backend::{ConnectivityProbe, Persistence, RemoteSink, Transport};
pub use document::{DocumentUpdate, EditableState, FlushOverride, RemoteDocument};
pub use emitter::ChangeEmitter;
pub use error::SyncError;
pub use flush::{FlushOutcome, FlushRegistration, FlushRegistry};
pub use offline::{CachedDocument, OfflineBaseline, OfflineReconciler, ReconcileOutcome};
pub use session::{
    Collaborators, Connectivity, DocumentSession, SessionEvent, SessionHandle, SessionInput,
    SessionOptions,
};
pub use status::{SyncStatus, SyncStatusMachine};
