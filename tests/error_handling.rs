//! Error handling and edge case tests.

mod common;

use annotation_store::{
    inline, AnnotationEvent, Availability, Collection, EventFilter, LocalStore, NodePath,
    NoteRecord, ReconcilePhase, Session, StoreError, TargetKind,
};
use common::*;
use sha2::{Digest, Sha256};
use std::fs;
use tempfile::TempDir;

// --- Backup Unavailable ---

#[tokio::test]
async fn test_disabled_backup_degrades_to_inline_only() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut doc = review_doc();
    inline::write_note_content(&mut doc, &note_slot(), "inline only").unwrap();
    write_doc(&dir, &doc);

    let mut cfg = config(&dir);
    cfg.store.enabled = false;
    let mut session = Session::open(cfg).unwrap();
    let failures = session.subscribe(EventFilter::failures());

    let report = session.reconcile_on_load().await;
    assert_eq!(report.phase, ReconcilePhase::Degraded);
    assert_eq!(session.phase(), ReconcilePhase::Degraded);
    assert_eq!(session.view().note(&note_slot()).unwrap().content, "inline only");
    assert!(matches!(
        failures.try_recv().unwrap(),
        AnnotationEvent::StoreUnavailable { .. }
    ));

    // Edits still land inline.
    session.paste_image(&image_slot(0), PNG, None).unwrap();
    let summary = session.settle_backups().await;
    assert_eq!(summary.failed, 1);
    assert!(inline::has_inline_state(session.document(), &image_slot(0), TargetKind::Image));
    assert!(matches!(
        session.store().availability(),
        Availability::Unavailable(_)
    ));
}

#[tokio::test]
async fn test_locked_backup_is_unavailable() {
    let dir = TempDir::new().unwrap();
    write_doc(&dir, &review_doc());

    let holder = LocalStore::new(config(&dir).store);
    holder.open().await.unwrap();

    let mut session = Session::open(config(&dir)).unwrap();
    let report = session.reconcile_on_load().await;
    assert_eq!(report.phase, ReconcilePhase::Degraded);
    assert!(report.degraded.unwrap().contains("locked"));
}

#[tokio::test]
async fn test_admin_deletes_work_without_backup() {
    let dir = TempDir::new().unwrap();
    let mut doc = review_doc();
    inline::write_note_content(&mut doc, &note_slot(), "stale").unwrap();
    write_doc(&dir, &doc);

    let mut cfg = config(&dir);
    cfg.store.enabled = false;
    let mut session = Session::open(cfg).unwrap();
    session.reconcile_on_load().await;

    let target = session.target_at(&note_slot()).unwrap();
    session.delete_record(&target).await.unwrap();
    assert!(session.view().note(&note_slot()).is_none());

    assert!(matches!(
        session.export_all().await,
        Err(StoreError::StoreUnavailable(_))
    ));
}

// --- Corrupt Backup Data ---

#[tokio::test]
async fn test_corrupt_record_counts_as_failed() {
    let dir = TempDir::new().unwrap();
    write_doc(&dir, &review_doc());
    let cfg = config(&dir);

    let store = LocalStore::new(cfg.store.clone());
    store
        .put(&NoteRecord {
            id: "home-1920x1080-opportunity-0".into(),
            content: "soon corrupt".into(),
            priority: None,
            effort: None,
        })
        .await
        .unwrap();
    drop(store);

    let digest = hex::encode(Sha256::digest(b"home-1920x1080-opportunity-0"));
    let record = cfg
        .store
        .path
        .join(Collection::Notes.name())
        .join(&digest[..2])
        .join(&digest);
    let mut bytes = fs::read(&record).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&record, bytes).unwrap();

    let mut session = Session::open(cfg).unwrap();
    let report = session.reconcile_on_load().await;

    assert_eq!(report.phase, ReconcilePhase::Complete);
    assert_eq!(report.recovery.unwrap().failed, 1);
    assert!(session.view().note(&note_slot()).is_none());
}

#[tokio::test]
async fn test_newer_schema_is_rejected() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let store = LocalStore::new(cfg.store.clone());
    store.open().await.unwrap();
    drop(store);

    // Bump the manifest version byte past what this build understands.
    let manifest = cfg.store.path.join("MANIFEST");
    let mut bytes = fs::read(&manifest).unwrap();
    bytes[4] = 99;
    fs::write(&manifest, bytes).unwrap();

    let store = LocalStore::new(cfg.store);
    assert!(matches!(store.open().await, Err(StoreError::StoreUnavailable(_))));
}

// --- Bad Input ---

#[tokio::test]
async fn test_paste_rejects_non_images() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::with_document(config(&dir), review_doc());

    let err = session
        .paste_image(&image_slot(0), b"just text", Some("text/plain"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedMedia(_)));
    assert!(session.view().image(&image_slot(0)).is_none());
    assert!(!session.scheduler().is_dirty());
    assert_eq!(session.settle_backups().await.written, 0);
}

#[tokio::test]
async fn test_interactions_outside_slots() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::with_document(config(&dir), review_doc());

    // The page card is neither a slot nor inside one.
    let page = NodePath::from_indices([0]);
    assert!(matches!(
        session.edit_note(&page, "x"),
        Err(StoreError::NotASlot(_))
    ));
    assert!(matches!(
        session.toggle_image(&NodePath::from_indices([9, 9])),
        Err(StoreError::NodeNotFound(_))
    ));
    assert!(matches!(
        session.remove_annotation_point(&page).await,
        Err(StoreError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn test_missing_document_file() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Session::open(config(&dir)),
        Err(StoreError::Io(_))
    ));
}

#[tokio::test]
async fn test_unknown_context_still_keys_the_slot() {
    use annotation_store::markup::builder::*;
    use annotation_store::Element;

    let dir = TempDir::new().unwrap();
    // A category with no name, outside any breakpoint section.
    let doc = document([page(
        "home",
        [Element::new("div")
            .with_class("assessment-category")
            .with_child(note_item("orphan"))],
    )]);
    let mut session = Session::with_document(config(&dir), doc);

    let slot = NodePath::from_indices([0, 0, 0, 1, 0]);
    let target = session.edit_note(&slot, "still saved").unwrap();
    assert_eq!(target.key(), "home-unknown-unknown-0");
    assert!(!target.is_complete());
    assert_eq!(session.settle_backups().await.written, 1);
}
