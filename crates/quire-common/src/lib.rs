//! quire-common: plumbing shared by the quire editor crates.
//!
//! - `transport`: wire protocol for room broadcasts and the presence map of
//!   remote collaborators
//! - `storage`: local-only key/value storage (in-memory and file-backed)
//! - `config`: engine configuration and its file loaders
//! - `telemetry`: tracing/metrics setup for binaries (feature `telemetry`)

pub mod config;
pub mod storage;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

pub use config::{Config, FileStore, Loader, Saver, SyncConfig, TimingPolicy};
pub use smol_str::SmolStr;
pub use storage::{FileStorage, LocalStorage, MemoryStorage, StorageError};

/// Identifier of a connected editor client.
pub type ClientId = SmolStr;

/// Identifier of a persisted document. Also used as the transport room name.
pub type DocumentId = SmolStr;
