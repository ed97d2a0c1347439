//! Single-slot flush strategy for external UI actions.
//!
//! Buttons that leave the editor ("publish", "close", navigation) need to make
//! sure pending edits are saved first, without knowing which editor is mounted.
//! The mounted session registers its flush function here; callers just call
//! [`FlushRegistry::flush`]. With nothing registered the flush is a no-op that
//! reports [`FlushOutcome::Unregistered`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use smol_str::SmolStr;

use crate::document::FlushOverride;

/// Result of a flush request. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The document was saved.
    Saved,
    /// Nothing differed from the last saved state.
    NoChanges,
    /// Offline: the changes stay local until reconnect.
    Deferred,
    /// The save failed; the document stays unsynchronized.
    Failed(SmolStr),
    /// No session is registered.
    Unregistered,
}

impl FlushOutcome {
    /// True if nothing is left unsaved after this flush.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Saved | Self::NoChanges)
    }
}

type FlushFn = Arc<dyn Fn(Option<FlushOverride>) -> BoxFuture<'static, FlushOutcome> + Send + Sync>;

/// Handle returned by [`FlushRegistry::register`], used to release the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRegistration(u64);

#[derive(Default)]
struct Slot {
    generation: u64,
    flush: Option<FlushFn>,
}

/// Holds the active flush function. Clones share the slot.
#[derive(Clone, Default)]
pub struct FlushRegistry {
    slot: Arc<Mutex<Slot>>,
    generations: Arc<AtomicU64>,
}

impl FlushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `flush` as the active flush function, replacing any other.
    pub fn register<F, Fut>(&self, flush: F) -> FlushRegistration
    where
        F: Fn(Option<FlushOverride>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlushOutcome> + Send + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let flush: FlushFn = Arc::new(move |overrides| flush(overrides).boxed());
        let mut slot = self.lock();
        if slot.flush.is_some() {
            tracing::debug!("replacing registered flush function");
        }
        *slot = Slot {
            generation,
            flush: Some(flush),
        };
        FlushRegistration(generation)
    }

    /// Reset to the no-op default if `registration` is still the active one.
    ///
    /// Returns false if someone else registered in the meantime.
    pub fn release(&self, registration: FlushRegistration) -> bool {
        let mut slot = self.lock();
        if slot.generation != registration.0 || slot.flush.is_none() {
            return false;
        }
        slot.flush = None;
        true
    }

    /// Reset to the no-op default unconditionally.
    pub fn reset(&self) {
        self.lock().flush = None;
    }

    pub fn is_registered(&self) -> bool {
        self.lock().flush.is_some()
    }

    /// Run the active flush function.
    pub async fn flush(&self, overrides: Option<FlushOverride>) -> FlushOutcome {
        // Don't hold the lock across the await.
        let flush = self.lock().flush.clone();
        match flush {
            Some(flush) => flush(overrides).await,
            None => FlushOutcome::Unregistered,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FlushRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_is_unregistered_noop() {
        let registry = FlushRegistry::new();
        assert!(!registry.is_registered());
        assert_eq!(registry.flush(None).await, FlushOutcome::Unregistered);
    }

    #[tokio::test]
    async fn test_registered_function_receives_override() {
        let registry = FlushRegistry::new();
        registry.register(|overrides: Option<FlushOverride>| async move {
            match overrides.and_then(|o| o.markdown) {
                Some(text) if text == "hi" => FlushOutcome::Saved,
                _ => FlushOutcome::NoChanges,
            }
        });

        assert_eq!(
            registry.flush(Some(FlushOverride::markdown("hi"))).await,
            FlushOutcome::Saved
        );
        assert_eq!(registry.clone().flush(None).await, FlushOutcome::NoChanges);
    }

    #[tokio::test]
    async fn test_release_only_resets_own_registration() {
        let registry = FlushRegistry::new();
        let first = registry.register(|_| async { FlushOutcome::Saved });
        let second = registry.register(|_| async { FlushOutcome::NoChanges });

        assert!(!registry.release(first));
        assert_eq!(registry.flush(None).await, FlushOutcome::NoChanges);

        assert!(registry.release(second));
        assert_eq!(registry.flush(None).await, FlushOutcome::Unregistered);
    }

    #[tokio::test]
    async fn test_reset() {
        let registry = FlushRegistry::new();
        registry.register(|_| async { FlushOutcome::Saved });
        registry.reset();
        assert!(!registry.is_registered());
        assert_eq!(registry.flush(None).await, FlushOutcome::Unregistered);
    }
}
