//! Merging inline markup with the backup store.
//!
//! Load runs two phases in order. Phase 1 replays every inline attribute into
//! the view; it is synchronous and never touches the backup. Phase 2 runs
//! only when phase 1 left gaps: it opens the backup and fills each empty slot
//! from it, writing the recovered value inline as well so the gap stays
//! closed. Phase 2 never replaces a slot phase 1 satisfied.
//!
//! Export is the opposite policy and only runs on request: every slot's
//! backup record overwrites whatever is inline.

use crate::error::{Result, StoreError};
use crate::events::{AnnotationEvent, EventBus};
use crate::identity::{enumerate_slots, Slot};
use crate::inline::{self, SavedNote};
use crate::local::LocalStore;
use crate::markup::Document;
use crate::types::{ImageRecord, NoteRecord, TargetKind};
use crate::view::ViewState;
use tracing::{debug, info, warn};

/// Where a document is in its load sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// Nothing applied yet.
    Fresh,
    /// Phase 1 done; gaps may remain.
    InlineLoaded,
    /// Both phases done (or nothing was missing).
    Complete,
    /// Phase 2 could not run; the session is inline-only.
    Degraded,
}

/// Outcome of phase 1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineLoad {
    pub images: usize,
    pub notes: usize,
    /// Slots with no inline state.
    pub gaps: Vec<Slot>,
}

/// Outcome of phase 2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub images: usize,
    pub notes: usize,
    /// Gaps the backup had nothing for.
    pub missing: usize,
    /// Gaps whose backup record could not be read.
    pub failed: usize,
}

impl Recovery {
    pub fn total(&self) -> usize {
        self.images + self.notes
    }
}

/// Outcome of a full load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadReport {
    pub phase: ReconcilePhase,
    pub inline_images: usize,
    pub inline_notes: usize,
    pub gaps: usize,
    pub recovery: Option<Recovery>,
    /// Why phase 2 was skipped, when it was.
    pub degraded: Option<String>,
}

/// Outcome of a full export.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub images: usize,
    pub notes: usize,
    pub failed: usize,
}

impl ExportReport {
    pub fn total(&self) -> usize {
        self.images + self.notes
    }
}

/// Phase 1: apply inline attributes to the view.
pub fn load_inline(doc: &Document, view: &mut ViewState) -> InlineLoad {
    let mut load = InlineLoad::default();

    for slot in enumerate_slots(doc) {
        let kind = slot.target.kind;
        if !inline::has_inline_state(doc, &slot.path, kind) {
            if !view.has_live_content(&slot.path, kind) {
                load.gaps.push(slot);
            }
            continue;
        }
        let applied = match kind {
            TargetKind::Image => inline::materialize_image(doc, view, &slot.path, false),
            TargetKind::Note => inline::materialize_note(doc, view, &slot.path, false),
        };
        if applied {
            match kind {
                TargetKind::Image => load.images += 1,
                TargetKind::Note => load.notes += 1,
            }
        }
    }

    debug!(
        images = load.images,
        notes = load.notes,
        gaps = load.gaps.len(),
        "inline state applied"
    );
    load
}

/// Runs the backup-dependent phases against one store.
pub struct Reconciler<'a> {
    store: &'a LocalStore,
    events: &'a EventBus,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a LocalStore, events: &'a EventBus) -> Self {
        Self { store, events }
    }

    /// Phase 1 then, if anything is missing, phase 2.
    ///
    /// An unavailable backup degrades to inline-only and is reported in the
    /// result; it is never an error.
    pub async fn reconcile_on_load(&self, doc: &mut Document, view: &mut ViewState) -> LoadReport {
        let load = load_inline(doc, view);
        let mut report = LoadReport {
            phase: ReconcilePhase::InlineLoaded,
            inline_images: load.images,
            inline_notes: load.notes,
            gaps: load.gaps.len(),
            recovery: None,
            degraded: None,
        };

        if load.gaps.is_empty() {
            report.phase = ReconcilePhase::Complete;
            return report;
        }

        match self.recover_gaps(doc, view, &load.gaps).await {
            Ok(recovery) => {
                report.phase = ReconcilePhase::Complete;
                report.recovery = Some(recovery);
            }
            Err(e) => {
                warn!(error = %e, "backup unavailable, continuing with inline state only");
                self.events.emit(AnnotationEvent::StoreUnavailable {
                    reason: e.to_string(),
                });
                report.phase = ReconcilePhase::Degraded;
                report.degraded = Some(e.to_string());
            }
        }
        report
    }

    /// Phase 2: fill `gaps` from the backup store.
    ///
    /// Slots that gained inline state or live content since the gap list was
    /// computed are skipped.
    pub async fn recover_gaps(
        &self,
        doc: &mut Document,
        view: &mut ViewState,
        gaps: &[Slot],
    ) -> Result<Recovery> {
        self.store.open().await?;
        let mut recovery = Recovery::default();

        for slot in gaps {
            let kind = slot.target.kind;
            if inline::has_inline_state(doc, &slot.path, kind) || view.has_live_content(&slot.path, kind) {
                continue;
            }
            let key = slot.target.key();

            let found = match self.fetch_into_inline(doc, slot, &key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(annotation = %slot.target, error = %e, "could not read backup record");
                    recovery.failed += 1;
                    continue;
                }
            };
            if !found {
                recovery.missing += 1;
                continue;
            }

            match kind {
                TargetKind::Image => {
                    inline::materialize_image(doc, view, &slot.path, false);
                    recovery.images += 1;
                }
                TargetKind::Note => {
                    inline::materialize_note(doc, view, &slot.path, false);
                    recovery.notes += 1;
                }
            }
            self.events.emit(AnnotationEvent::Recovered {
                collection: kind.collection(),
                key,
            });
        }

        info!(
            images = recovery.images,
            notes = recovery.notes,
            missing = recovery.missing,
            failed = recovery.failed,
            "gap recovery finished"
        );
        Ok(recovery)
    }

    /// Phase 3: overwrite inline state with every backup record the document
    /// has a slot for.
    pub async fn export_all(&self, doc: &mut Document, view: &mut ViewState) -> Result<ExportReport> {
        self.store.open().await?;
        let mut report = ExportReport::default();

        for slot in enumerate_slots(doc) {
            let key = slot.target.key();
            let found = match self.fetch_into_inline(doc, &slot, &key).await {
                Ok(found) => found,
                Err(StoreError::StoreUnavailable(reason)) => {
                    return Err(StoreError::StoreUnavailable(reason));
                }
                Err(e) => {
                    warn!(annotation = %slot.target, error = %e, "skipping unreadable backup record");
                    report.failed += 1;
                    continue;
                }
            };
            if !found {
                continue;
            }
            match slot.target.kind {
                TargetKind::Image => {
                    inline::materialize_image(doc, view, &slot.path, true);
                    report.images += 1;
                }
                TargetKind::Note => {
                    inline::materialize_note(doc, view, &slot.path, true);
                    report.notes += 1;
                }
            }
        }

        info!(images = report.images, notes = report.notes, "export finished");
        self.events.emit(AnnotationEvent::Exported {
            images: report.images,
            notes: report.notes,
        });
        Ok(report)
    }

    /// Copy the backup record for `slot` into the markup. Returns whether one
    /// existed.
    async fn fetch_into_inline(&self, doc: &mut Document, slot: &Slot, key: &str) -> Result<bool> {
        match slot.target.kind {
            TargetKind::Image => match self.store.get::<ImageRecord>(key).await? {
                Some(record) => {
                    inline::write_image(doc, &slot.path, &record.data)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            TargetKind::Note => match self.store.get::<NoteRecord>(key).await? {
                Some(record) => {
                    inline::write_note(doc, &slot.path, &SavedNote::from(&record))?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }
}
