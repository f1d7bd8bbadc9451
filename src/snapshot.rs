//! Trailing-edge debounce for full-document snapshots.

use std::time::Duration;
use tokio::time::Instant;

/// Default quiet interval between the last edit and the snapshot.
pub const DEFAULT_QUIET: Duration = Duration::from_secs(2);

/// Coalesces bursts of edits into one snapshot.
///
/// Every edit pushes the deadline to `edit + quiet`; the snapshot becomes
/// due once no edit has arrived for a full quiet interval.
#[derive(Clone, Debug)]
pub struct SnapshotScheduler {
    quiet: Duration,
    deadline: Option<Instant>,
    pending_edits: u64,
    snapshots_taken: u64,
}

impl SnapshotScheduler {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
            pending_edits: 0,
            snapshots_taken: 0,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn mark_dirty(&mut self) {
        self.mark_dirty_at(Instant::now());
    }

    pub fn mark_dirty_at(&mut self, now: Instant) {
        self.pending_edits = self.pending_edits.saturating_add(1);
        self.deadline = Some(now + self.quiet);
    }

    pub fn is_dirty(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// If the snapshot is due at `now`, consume it and return the number of
    /// edits it covers.
    pub fn take_due(&mut self, now: Instant) -> Option<u64> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.snapshots_taken += 1;
                Some(std::mem::take(&mut self.pending_edits))
            }
            _ => None,
        }
    }

    /// Forget pending edits; used after an explicit save.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending_edits = 0;
    }

    pub fn snapshots_taken(&self) -> u64 {
        self.snapshots_taken
    }
}

impl Default for SnapshotScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET)
    }
}
