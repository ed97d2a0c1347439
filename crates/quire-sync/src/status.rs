//! Sync status of a document session.

use serde::{Deserialize, Serialize};

/// Sync state of a document with respect to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Everything local has been saved.
    #[default]
    Synchronized,
    /// A save is in flight.
    Saving,
    /// Local changes not yet saved.
    Unsynchronized,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synchronized => "synchronized",
            Self::Saving => "saving",
            Self::Unsynchronized => "unsynchronized",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition rules for [`SyncStatus`].
///
/// ```text
/// synchronized --edit--> unsynchronized --flush--> saving --ok--> synchronized
///                                                        \--err--> unsynchronized
/// ```
///
/// An edit made while saving doesn't change the status; it is remembered and
/// reported when the save finishes so the caller can run one follow-up flush.
#[derive(Debug, Clone, Default)]
pub struct SyncStatusMachine {
    status: SyncStatus,
    queued: bool,
}

impl SyncStatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_saving(&self) -> bool {
        self.status == SyncStatus::Saving
    }

    /// Record a local edit.
    pub fn local_edit(&mut self) {
        match self.status {
            SyncStatus::Saving => {
                if !self.queued {
                    tracing::debug!("edit during save, queueing follow-up");
                }
                self.queued = true;
            }
            SyncStatus::Synchronized => self.transition(SyncStatus::Unsynchronized),
            SyncStatus::Unsynchronized => {}
        }
    }

    /// Enter `saving`. Returns false if a save is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.is_saving() {
            return false;
        }
        self.transition(SyncStatus::Saving);
        true
    }

    /// Leave `saving` with the outcome of the save.
    ///
    /// Returns whether an edit was queued while saving, clearing the flag.
    pub fn finish_flush(&mut self, ok: bool) -> bool {
        if !self.is_saving() {
            tracing::warn!(status = %self.status, "finish_flush without a save in flight");
        }
        self.transition(if ok {
            SyncStatus::Synchronized
        } else {
            SyncStatus::Unsynchronized
        });
        std::mem::take(&mut self.queued)
    }

    /// Set the status from dirtiness, unless a save is running.
    pub fn settle(&mut self, dirty: bool) {
        if self.is_saving() {
            return;
        }
        self.transition(if dirty {
            SyncStatus::Unsynchronized
        } else {
            SyncStatus::Synchronized
        });
    }

    fn transition(&mut self, to: SyncStatus) {
        if self.status != to {
            tracing::debug!(from = %self.status, %to, "sync status");
            self.status = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut machine = SyncStatusMachine::new();
        assert_eq!(machine.status(), SyncStatus::Synchronized);

        machine.local_edit();
        assert_eq!(machine.status(), SyncStatus::Unsynchronized);
        machine.local_edit();
        assert_eq!(machine.status(), SyncStatus::Unsynchronized);

        assert!(machine.begin_flush());
        assert_eq!(machine.status(), SyncStatus::Saving);
        assert!(!machine.finish_flush(true));
        assert_eq!(machine.status(), SyncStatus::Synchronized);
    }

    #[test]
    fn test_saving_to_saving_is_a_noop() {
        let mut machine = SyncStatusMachine::new();
        machine.local_edit();
        assert!(machine.begin_flush());
        assert!(!machine.begin_flush());
        assert_eq!(machine.status(), SyncStatus::Saving);
    }

    #[test]
    fn test_edit_while_saving_is_queued_once() {
        let mut machine = SyncStatusMachine::new();
        machine.local_edit();
        machine.begin_flush();

        machine.local_edit();
        machine.local_edit();
        assert_eq!(machine.status(), SyncStatus::Saving);

        assert!(machine.finish_flush(true));
        // Consumed by the first follow-up.
        machine.begin_flush();
        assert!(!machine.finish_flush(true));
    }

    #[test]
    fn test_failure_leaves_unsynchronized() {
        let mut machine = SyncStatusMachine::new();
        machine.local_edit();
        machine.begin_flush();
        assert!(!machine.finish_flush(false));
        assert_eq!(machine.status(), SyncStatus::Unsynchronized);
    }

    #[test]
    fn test_settle_respects_in_flight_save() {
        let mut machine = SyncStatusMachine::new();
        machine.settle(true);
        assert_eq!(machine.status(), SyncStatus::Unsynchronized);
        machine.begin_flush();
        machine.settle(false);
        assert_eq!(machine.status(), SyncStatus::Saving);
        machine.finish_flush(true);
        machine.settle(false);
        assert_eq!(machine.status(), SyncStatus::Synchronized);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SyncStatus::Unsynchronized.to_string(), "unsynchronized");
        assert_eq!(
            serde_json::to_string(&SyncStatus::Saving).unwrap(),
            "\"saving\""
        );
    }
}
