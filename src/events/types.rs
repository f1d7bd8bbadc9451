//! Event types for the annotation event bus.

use crate::types::Collection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping the subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: EventFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: EventFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Backup write outcomes.
    pub include_backup: bool,

    /// Snapshot writes.
    pub include_snapshots: bool,

    /// Load-time recovery, export and store availability.
    pub include_reconcile: bool,

    /// Only pass failures through.
    pub failures_only: bool,
}

impl EventFilter {
    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            include_backup: true,
            include_snapshots: true,
            include_reconcile: true,
            failures_only: false,
        }
    }

    /// Subscribe to failures of any kind.
    pub fn failures() -> Self {
        Self {
            failures_only: true,
            ..Self::all()
        }
    }

    pub fn backup() -> Self {
        Self {
            include_backup: true,
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, event: &AnnotationEvent) -> bool {
        if self.failures_only && !event.is_failure() {
            return false;
        }
        match event {
            AnnotationEvent::BackupWritten { .. } | AnnotationEvent::BackupWriteFailed { .. } => {
                self.include_backup
            }
            AnnotationEvent::SnapshotWritten { .. } | AnnotationEvent::SnapshotFailed { .. } => {
                self.include_snapshots
            }
            AnnotationEvent::StoreUnavailable { .. }
            | AnnotationEvent::Recovered { .. }
            | AnnotationEvent::Exported { .. } => self.include_reconcile,
            AnnotationEvent::Dropped { .. } => true,
        }
    }
}

/// Events emitted by a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationEvent {
    // --- Backup Events ---
    /// A write-through to the backup store finished.
    BackupWritten {
        collection: Collection,
        key: String,
    },

    /// A write-through to the backup store failed. Inline data is unaffected.
    BackupWriteFailed {
        collection: Collection,
        key: String,
        error: String,
    },

    // --- Snapshot Events ---
    SnapshotWritten {
        path: PathBuf,
    },

    SnapshotFailed {
        path: PathBuf,
        error: String,
    },

    // --- Reconcile Events ---
    /// The backup store could not be opened; running inline-only.
    StoreUnavailable {
        reason: String,
    },

    /// A gap was filled from the backup store.
    Recovered {
        collection: Collection,
        key: String,
    },

    /// A full export finished.
    Exported {
        images: usize,
        notes: usize,
    },

    // --- Lifecycle Events ---
    /// Subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

impl AnnotationEvent {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AnnotationEvent::BackupWriteFailed { .. }
                | AnnotationEvent::SnapshotFailed { .. }
                | AnnotationEvent::StoreUnavailable { .. }
        )
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to receive events.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<AnnotationEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<AnnotationEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<AnnotationEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<AnnotationEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<AnnotationEvent> {
        self.receiver.try_iter().collect()
    }
}
