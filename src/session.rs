//! The editing session: annotation controllers and administrative actions.
//!
//! Every controller follows the same sequence. It updates the view, writes
//! the inline attribute synchronously, spawns the backup write and marks the
//! snapshot scheduler dirty. The spawned write never blocks the controller;
//! its outcome is reported through the event bus and `tracing`.

use crate::error::{Result, StoreError};
use crate::events::{AnnotationEvent, EventBus, EventFilter, SubscriptionConfig, SubscriptionHandle};
use crate::identity::{
    derive_target, enumerate_slots, find_slot, resolve_slot, resolve_slot_of, AnnotationTarget, Slot,
};
use crate::inline;
use crate::local::{LocalStore, LocalStoreConfig};
use crate::markup::classes::*;
use crate::markup::{builder, Document, NodePath};
use crate::media;
use crate::reconcile::{ExportReport, LoadReport, ReconcilePhase, Reconciler, Recovery};
use crate::snapshot::{SnapshotScheduler, DEFAULT_QUIET};
use crate::types::{Collection, CollectionRecord, Effort, ImageRecord, Priority, TargetKind, Timestamp};
use crate::view::{ImageView, ViewState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Document file that snapshots and saves write to.
    pub document_path: PathBuf,

    /// Backup store settings.
    pub store: LocalStoreConfig,

    /// Quiet interval before a snapshot is written.
    /// Default: 2s
    pub snapshot_quiet: Duration,

    /// Buffer size for subscriptions made through [`Session::subscribe`].
    /// Default: 1000
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("./review.json"),
            store: LocalStoreConfig::default(),
            snapshot_quiet: DEFAULT_QUIET,
            event_buffer: 1000,
        }
    }
}

/// Outcome of awaiting outstanding backup writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub written: usize,
    pub failed: usize,
}

/// One open document with its view, backup store and snapshot timer.
///
/// The session owns no background timer. Whoever drives it calls
/// [`Session::tick`] or awaits [`Session::run_pending_snapshot`] to get the
/// debounced snapshot written; until then edits live in memory and in the
/// backup only. A typical event loop races the next input against the
/// snapshot deadline:
///
/// ```no_run
/// # use annotation_store::Session;
/// # use tokio::time::Instant;
/// # async fn drive(mut session: Session, mut input: tokio::sync::mpsc::Receiver<String>) {
/// # let slot = annotation_store::NodePath::from_indices([0]);
/// loop {
///     let deadline = session.scheduler().next_deadline();
///     tokio::select! {
///         Some(text) = input.recv() => {
///             let _ = session.edit_note(&slot, &text);
///         }
///         _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
///             session.tick(Instant::now());
///         }
///         else => break,
///     }
/// }
/// # }
/// ```
pub struct Session {
    config: SessionConfig,
    document: Document,
    view: ViewState,
    store: Arc<LocalStore>,
    events: EventBus,
    scheduler: SnapshotScheduler,
    phase: ReconcilePhase,
    pending_backups: Vec<JoinHandle<Result<()>>>,
    /// Completion signal of the most recently spawned backup write.
    last_backup: Option<oneshot::Receiver<()>>,
}

impl Session {
    /// Load the document file named in `config`.
    ///
    /// The backup store is created but not opened; call
    /// [`Session::reconcile_on_load`] to apply saved state.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let document = Document::load(&config.document_path)?;
        Ok(Self::with_document(config, document))
    }

    /// Start a session on an in-memory document.
    pub fn with_document(config: SessionConfig, document: Document) -> Self {
        let store = Arc::new(LocalStore::new(config.store.clone()));
        Self::with_store(config, document, store)
    }

    /// Start a session sharing an existing backup store.
    pub fn with_store(config: SessionConfig, document: Document, store: Arc<LocalStore>) -> Self {
        let scheduler = SnapshotScheduler::new(config.snapshot_quiet);
        Self {
            config,
            document,
            view: ViewState::new(),
            store,
            events: EventBus::new(),
            scheduler,
            phase: ReconcilePhase::Fresh,
            pending_backups: Vec::new(),
            last_backup: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn scheduler(&self) -> &SnapshotScheduler {
        &self.scheduler
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    /// Subscribe to session events with the configured buffer size.
    pub fn subscribe(&self, filter: EventFilter) -> SubscriptionHandle {
        self.events.subscribe(SubscriptionConfig {
            buffer_size: self.config.event_buffer,
            filter,
        })
    }

    /// Every slot of the current document.
    pub fn slots(&self) -> Vec<Slot> {
        enumerate_slots(&self.document)
    }

    /// Identity of the slot an interaction at `at` refers to.
    pub fn target_at(&self, at: &NodePath) -> Result<AnnotationTarget> {
        let (slot, _) = resolve_slot(&self.document, at)?;
        derive_target(&self.document, &slot)
    }

    /// Apply inline state, then fill gaps from the backup.
    ///
    /// Recovered records are written inline and a snapshot is scheduled, so
    /// the next load finds them in the document itself.
    pub async fn reconcile_on_load(&mut self) -> LoadReport {
        let reconciler = Reconciler::new(&self.store, &self.events);
        let report = reconciler
            .reconcile_on_load(&mut self.document, &mut self.view)
            .await;
        self.phase = report.phase;
        if report.recovery.as_ref().is_some_and(|r| r.total() > 0) {
            self.scheduler.mark_dirty();
        }
        info!(
            phase = ?report.phase,
            images = report.inline_images,
            notes = report.inline_notes,
            gaps = report.gaps,
            "document loaded"
        );
        report
    }

    // =========================================================================
    // Controllers
    // =========================================================================

    /// Attach pasted image bytes to the image slot at (or around) `at`.
    pub fn paste_image(&mut self, at: &NodePath, bytes: &[u8], declared_mime: Option<&str>) -> Result<AnnotationTarget> {
        let (slot, target) = self.resolve(at, TargetKind::Image)?;
        let data = media::encode_data_url(bytes, declared_mime)?;

        let visible = inline::image_visible(&self.document, &slot);
        self.view.set_image(
            slot.clone(),
            ImageView {
                src: data.clone(),
                visible,
            },
        );
        inline::write_image(&mut self.document, &slot, &data)?;

        self.spawn_backup(ImageRecord {
            id: target.key(),
            data,
            saved_at: Timestamp::now(),
        });
        self.scheduler.mark_dirty();
        debug!(annotation = %target, bytes = bytes.len(), "image pasted");
        Ok(target)
    }

    /// Flip the visibility of an image slot. Returns the new visibility.
    ///
    /// Visibility lives only in the markup; the backup record is untouched.
    pub fn toggle_image(&mut self, at: &NodePath) -> Result<bool> {
        let (slot, _) = self.resolve(at, TargetKind::Image)?;
        let visible = !inline::image_visible(&self.document, &slot);

        if let Some(image) = self.view.image_mut(&slot) {
            image.visible = visible;
        }
        inline::set_image_visible(&mut self.document, &slot, visible)?;
        self.scheduler.mark_dirty();
        Ok(visible)
    }

    /// Handle a click on a priority button.
    pub fn select_priority(&mut self, button: &NodePath) -> Result<AnnotationTarget> {
        let value = button_value::<Priority>(&self.document, button, PRIORITY_BUTTON, ATTR_PRIORITY)?;
        self.set_priority(button, Some(value))
    }

    /// Handle a click on an effort button.
    pub fn select_effort(&mut self, button: &NodePath) -> Result<AnnotationTarget> {
        let value = button_value::<Effort>(&self.document, button, EFFORT_BUTTON, ATTR_EFFORT)?;
        self.set_effort(button, Some(value))
    }

    /// Set or clear the priority of the note at (or around) `at`.
    pub fn set_priority(&mut self, at: &NodePath, priority: Option<Priority>) -> Result<AnnotationTarget> {
        let (slot, target) = self.resolve(at, TargetKind::Note)?;
        if let Some(p) = priority {
            if inline::priority_button(&self.document, &slot, p).is_none() {
                return Err(StoreError::InvalidOperation(format!("no {p} button for {target}")));
            }
        }

        self.view.note_mut(&slot).priority = priority;
        inline::write_note_priority(&mut self.document, &slot, priority)?;
        self.backup_note(&slot, &target);
        self.scheduler.mark_dirty();
        Ok(target)
    }

    /// Set or clear the effort of the note at (or around) `at`.
    pub fn set_effort(&mut self, at: &NodePath, effort: Option<Effort>) -> Result<AnnotationTarget> {
        let (slot, target) = self.resolve(at, TargetKind::Note)?;
        if let Some(e) = effort {
            if inline::effort_button(&self.document, &slot, e).is_none() {
                return Err(StoreError::InvalidOperation(format!("no {e} button for {target}")));
            }
        }

        self.view.note_mut(&slot).effort = effort;
        inline::write_note_effort(&mut self.document, &slot, effort)?;
        self.backup_note(&slot, &target);
        self.scheduler.mark_dirty();
        Ok(target)
    }

    /// Replace the text of the note at (or around) `at`.
    pub fn edit_note(&mut self, at: &NodePath, text: &str) -> Result<AnnotationTarget> {
        let (slot, target) = self.resolve(at, TargetKind::Note)?;

        self.view.note_mut(&slot).content = text.to_string();
        inline::write_note_content(&mut self.document, &slot, text)?;
        self.backup_note(&slot, &target);
        self.scheduler.mark_dirty();
        Ok(target)
    }

    /// Append a new item of `kind` to a category container.
    ///
    /// Returns the new slot and its identity.
    pub fn add_annotation_point(
        &mut self,
        category: &NodePath,
        kind: TargetKind,
        label: &str,
    ) -> Result<(NodePath, AnnotationTarget)> {
        if !self.document.require(category)?.has_class(CATEGORY) {
            return Err(StoreError::InvalidOperation(format!(
                "{category} is not a category container"
            )));
        }

        let item = self.document.insert_child(category, builder::item(kind, label))?;
        let (slot, _) = resolve_slot(&self.document, &item)?;
        let target = derive_target(&self.document, &slot)?;
        self.scheduler.mark_dirty();
        info!(annotation = %target, "annotation point added");
        Ok((slot, target))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write the whole document to the configured path now.
    pub fn save_now(&mut self) -> Result<()> {
        let path = self.config.document_path.clone();
        self.scheduler.cancel();
        match self.document.save(&path) {
            Ok(()) => {
                info!(path = %path.display(), "document saved");
                self.events.emit(AnnotationEvent::SnapshotWritten { path });
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "document save failed");
                self.events.emit(AnnotationEvent::SnapshotFailed {
                    path,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Write a copy of the document somewhere else, leaving the timer alone.
    pub fn save_as(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.document.save(dest)
    }

    /// Write the debounced snapshot if it is due at `now`.
    ///
    /// Returns whether a snapshot was written. A failed write is reported and
    /// re-armed for another quiet interval.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(edits) = self.scheduler.take_due(now) else {
            return false;
        };
        let path = self.config.document_path.clone();
        match self.document.save(&path) {
            Ok(()) => {
                debug!(path = %path.display(), edits, "snapshot written");
                self.events.emit(AnnotationEvent::SnapshotWritten { path });
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot failed");
                self.events.emit(AnnotationEvent::SnapshotFailed {
                    path,
                    error: e.to_string(),
                });
                self.scheduler.mark_dirty_at(now);
                false
            }
        }
    }

    /// Sleep until the pending snapshot is due, then write it.
    pub async fn run_pending_snapshot(&mut self) -> bool {
        let Some(deadline) = self.scheduler.next_deadline() else {
            return false;
        };
        tokio::time::sleep_until(deadline).await;
        self.tick(Instant::now())
    }

    // =========================================================================
    // Backup writes
    // =========================================================================

    /// Await every outstanding backup write.
    ///
    /// Writes that already finished and were pruned from the pending list
    /// are not counted again.
    pub async fn settle_backups(&mut self) -> BackupSummary {
        self.last_backup = None;
        let mut summary = BackupSummary::default();
        for handle in self.pending_backups.drain(..) {
            match handle.await {
                Ok(Ok(())) => summary.written += 1,
                Ok(Err(_)) => summary.failed += 1,
                Err(e) => {
                    warn!(error = %e, "backup task did not complete");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn backup_note(&mut self, slot: &NodePath, target: &AnnotationTarget) {
        let record = inline::read_note(&self.document, slot)
            .unwrap_or_default()
            .into_record(target.key());
        self.spawn_backup(record);
    }

    fn spawn_backup<R: CollectionRecord>(&mut self, record: R) {
        let collection = R::COLLECTION;
        let key = record.key().to_string();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(collection = %collection, key = %key, "no runtime for backup write");
                self.events.emit(AnnotationEvent::BackupWriteFailed {
                    collection,
                    key,
                    error: e.to_string(),
                });
                return;
            }
        };

        // Each write waits for the one before it, so the last write wins.
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.last_backup.replace(done_rx);
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let handle = runtime.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = store.put(&record).await;
            let _ = done_tx.send(());
            match result {
                Ok(()) => {
                    events.emit(AnnotationEvent::BackupWritten {
                        collection,
                        key,
                    });
                    Ok(())
                }
                Err(e) => {
                    warn!(collection = %collection, key = %key, error = %e, "backup write failed");
                    events.emit(AnnotationEvent::BackupWriteFailed {
                        collection,
                        key,
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        });

        self.pending_backups.retain(|h| !h.is_finished());
        self.pending_backups.push(handle);
    }

    // =========================================================================
    // Administrative actions
    // =========================================================================

    /// Fill every empty slot from the backup on demand.
    pub async fn recover_from_backup(&mut self) -> Result<Recovery> {
        self.settle_backups().await;
        let gaps: Vec<Slot> = enumerate_slots(&self.document)
            .into_iter()
            .filter(|slot| {
                let kind = slot.target.kind;
                !inline::has_inline_state(&self.document, &slot.path, kind)
                    && !self.view.has_live_content(&slot.path, kind)
            })
            .collect();

        let reconciler = Reconciler::new(&self.store, &self.events);
        let recovery = reconciler
            .recover_gaps(&mut self.document, &mut self.view, &gaps)
            .await?;
        self.phase = ReconcilePhase::Complete;
        if recovery.total() > 0 {
            self.scheduler.mark_dirty();
        }
        Ok(recovery)
    }

    /// Overwrite inline state with every backup record, then save the
    /// document as a standalone copy of all annotations.
    pub async fn export_all(&mut self) -> Result<ExportReport> {
        self.settle_backups().await;
        let reconciler = Reconciler::new(&self.store, &self.events);
        let report = reconciler.export_all(&mut self.document, &mut self.view).await?;
        self.save_now()?;
        Ok(report)
    }

    /// Delete one annotation from both stores, save and reload.
    pub async fn delete_record(&mut self, target: &AnnotationTarget) -> Result<LoadReport> {
        self.settle_backups().await;
        self.delete_from_backup(target.kind.collection(), &target.key()).await?;

        if let Some(slot) = find_slot(&self.document, target) {
            match target.kind {
                TargetKind::Image => {
                    inline::remove_image(&mut self.document, &slot)?;
                    self.view.remove_image(&slot);
                }
                TargetKind::Note => {
                    inline::remove_note(&mut self.document, &slot)?;
                    self.view.remove_note(&slot);
                }
            }
        }
        info!(annotation = %target, "annotation deleted");

        self.save_now()?;
        self.reload().await
    }

    /// Delete every annotation from both stores, save and reload.
    pub async fn delete_all_records(&mut self) -> Result<LoadReport> {
        self.settle_backups().await;
        for collection in Collection::ALL {
            match self.store.clear(collection).await {
                Ok(n) => debug!(collection = %collection, removed = n, "backup collection cleared"),
                Err(StoreError::StoreUnavailable(reason)) => {
                    warn!(reason = %reason, "backup unavailable, clearing inline state only");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let removed = inline::strip_annotations(&mut self.document);
        self.view.clear();
        info!(attributes = removed, "all annotations deleted");

        self.save_now()?;
        self.reload().await
    }

    /// Remove an item from the document, save and reload.
    ///
    /// Later items of the same category shift down one index, so they pick up
    /// whatever the backup holds under their new keys.
    pub async fn remove_annotation_point(&mut self, item: &NodePath) -> Result<LoadReport> {
        if !self.document.require(item)?.has_class(ITEM) {
            return Err(StoreError::InvalidOperation(format!("{item} is not an assessment item")));
        }
        self.settle_backups().await;
        self.document.remove(item)?;
        self.save_now()?;
        self.reload().await
    }

    /// Re-read the document file and reconcile from scratch.
    pub async fn reload(&mut self) -> Result<LoadReport> {
        self.settle_backups().await;
        self.document = Document::load(&self.config.document_path)?;
        self.view.clear();
        self.scheduler.cancel();
        self.phase = ReconcilePhase::Fresh;
        Ok(self.reconcile_on_load().await)
    }

    async fn delete_from_backup(&self, collection: Collection, key: &str) -> Result<()> {
        match self.store.delete(collection, key).await {
            Ok(existed) => {
                debug!(collection = %collection, key, existed, "backup record deleted");
                Ok(())
            }
            Err(StoreError::StoreUnavailable(reason)) => {
                warn!(reason = %reason, key, "backup unavailable, deleting inline state only");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn resolve(&self, at: &NodePath, expected: TargetKind) -> Result<(NodePath, AnnotationTarget)> {
        let slot = resolve_slot_of(&self.document, at, expected)?;
        let target = derive_target(&self.document, &slot)?;
        Ok((slot, target))
    }
}

fn button_value<T: std::str::FromStr<Err = String>>(
    doc: &Document,
    button: &NodePath,
    class: &str,
    attr: &str,
) -> Result<T> {
    let element = doc.require(button)?;
    if !element.has_class(class) {
        return Err(StoreError::InvalidOperation(format!("{button} is not a {class}")));
    }
    element
        .attr(attr)
        .ok_or_else(|| StoreError::InvalidOperation(format!("{button} has no {attr}")))?
        .parse()
        .map_err(StoreError::InvalidOperation)
}
