//! Offline editing and reconciliation on reconnect.
//!
//! When a session goes offline it stores a baseline: the text as it was at
//! that moment. Edits then stay local. On reconnect the remote copy is
//! fetched and compared with the baseline:
//!
//! - remote still matches the baseline: nobody else saved meanwhile, so the
//!   local state is pushed as an ordinary update;
//! - remote moved on: both sides changed. Rather than merging, the local
//!   version is saved as a new document and the session adopts the remote one.
//!
//! Any failure along the way leaves the baseline in place so the next attempt
//! makes the same decision.

use std::sync::Arc;

use quire_common::storage::{LocalStorage, StorageError};
use quire_common::DocumentId;
use quire_editor_core::{normalize, now_millis};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::backend::Persistence;
use crate::document::{DocumentUpdate, EditableState};
use crate::error::SyncError;

/// Storage key of the local cache entry of a document.
pub fn cache_key(id: &DocumentId) -> String {
    format!("doc:{id}")
}

/// Storage key of the offline baseline of a document.
pub fn baseline_key(id: &DocumentId) -> String {
    format!("offline_baseline:{id}")
}

/// Text of a document at the moment it went offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineBaseline {
    pub text: String,
    /// Milliseconds since the unix epoch.
    pub captured_at: i64,
}

/// Local mirror of a document's editable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub id: DocumentId,
    pub title: SmolStr,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<SmolStr>,
    pub updated_at: i64,
    pub cached_at: i64,
}

impl CachedDocument {
    pub fn state(&self) -> EditableState {
        EditableState {
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No baseline was stored; there is nothing to reconcile.
    NoBaseline,
    /// Remote was unchanged and the local state was saved over it.
    Pushed,
    /// Remote had diverged. The local state now lives in a new document.
    Forked {
        document_id: DocumentId,
        title: SmolStr,
        /// Remote state the session should switch to.
        remote: EditableState,
    },
}

/// Baseline bookkeeping and the reconnect decision.
#[derive(Clone)]
pub struct OfflineReconciler {
    storage: Arc<dyn LocalStorage>,
    fork_title_suffix: SmolStr,
}

impl OfflineReconciler {
    pub fn new(storage: Arc<dyn LocalStorage>, fork_title_suffix: impl Into<SmolStr>) -> Self {
        Self {
            storage,
            fork_title_suffix: fork_title_suffix.into(),
        }
    }

    /// Record that `id` went offline with `state`.
    ///
    /// Captures the baseline unless one is already stored, then mirrors the
    /// state into the cache. Returns true if a new baseline was captured.
    pub fn go_offline(&self, id: &DocumentId, state: &EditableState) -> Result<bool, StorageError> {
        let captured = if self.baseline(id)?.is_some() {
            tracing::debug!(document = %id, "keeping existing offline baseline");
            false
        } else {
            let baseline = OfflineBaseline {
                text: state.content.clone(),
                captured_at: now_millis(),
            };
            self.storage.set(&baseline_key(id), &baseline)?;
            tracing::debug!(document = %id, "captured offline baseline");
            true
        };
        self.cache(id, state)?;
        Ok(captured)
    }

    pub fn baseline(&self, id: &DocumentId) -> Result<Option<OfflineBaseline>, StorageError> {
        self.storage.get(&baseline_key(id))
    }

    /// Mirror `state` into the local cache.
    pub fn cache(&self, id: &DocumentId, state: &EditableState) -> Result<(), StorageError> {
        let now = now_millis();
        let entry = CachedDocument {
            id: id.clone(),
            title: state.title.clone(),
            content: state.content.clone(),
            tags: state.tags.clone(),
            updated_at: now,
            cached_at: now,
        };
        self.storage.set(&cache_key(id), &entry)
    }

    pub fn cached(&self, id: &DocumentId) -> Result<Option<CachedDocument>, StorageError> {
        self.storage.get(&cache_key(id))
    }

    pub fn clear_cache(&self, id: &DocumentId) -> Result<(), StorageError> {
        self.storage.remove(&cache_key(id))
    }

    /// Reconcile `local` with the remote copy of `id`.
    ///
    /// On error nothing has been decided and the baseline is kept.
    pub async fn reconcile<P: Persistence + ?Sized>(
        &self,
        persistence: &P,
        id: &DocumentId,
        local: &EditableState,
    ) -> Result<ReconcileOutcome, SyncError> {
        let Some(baseline) = self.baseline(id)? else {
            return Ok(ReconcileOutcome::NoBaseline);
        };

        let remote = persistence.fetch_document(id).await?;
        let local = local.normalized();

        let outcome = if normalize(&remote.content) == normalize(&baseline.text) {
            tracing::debug!(document = %id, "remote unchanged while offline, pushing");
            persistence
                .save_document(id, DocumentUpdate::from(local))
                .await?;
            ReconcileOutcome::Pushed
        } else {
            let title: SmolStr = format!("{}{}", local.title, self.fork_title_suffix).into();
            let document_id = persistence
                .create_document(DocumentUpdate {
                    title: title.clone(),
                    content: local.content,
                    tags: local.tags,
                })
                .await?;
            tracing::info!(
                document = %id,
                fork = %document_id,
                "remote diverged while offline, forked local copy"
            );
            ReconcileOutcome::Forked {
                document_id,
                title,
                remote: remote.state(),
            }
        };

        // The decision has been carried out; a stale baseline would only
        // repeat it.
        if let Err(e) = self.storage.remove(&baseline_key(id)) {
            tracing::warn!(document = %id, error = %e, "failed to discard offline baseline");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for OfflineReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineReconciler")
            .field("fork_title_suffix", &self.fork_title_suffix)
            .finish_non_exhaustive()
    }
}
