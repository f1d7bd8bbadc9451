#![allow(dead_code)]

use annotation_store::markup::builder::*;
use annotation_store::{Document, LocalStoreConfig, NodePath, SessionConfig};
use std::time::Duration;
use tempfile::TempDir;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 13, b'I', b'H', b'D', b'R'];
pub const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0, 16, b'J', b'F', b'I', b'F'];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// home / 1920x1080 / opportunity with one note item, then two image items.
pub fn review_doc() -> Document {
    document([page(
        "home",
        [breakpoint(
            "1920x1080",
            [category(
                "opportunity",
                [note_item("cta"), image_item("hero"), image_item("footer")],
            )],
        )],
    )])
}

pub fn note_slot() -> NodePath {
    NodePath::from_indices([0, 0, 0, 0, 1, 0])
}

pub fn priority_button(k: usize) -> NodePath {
    NodePath::from_indices([0, 0, 0, 0, 1, 1, k])
}

pub fn effort_button(k: usize) -> NodePath {
    NodePath::from_indices([0, 0, 0, 0, 1, 2, k])
}

pub fn image_slot(i: usize) -> NodePath {
    NodePath::from_indices([0, 0, 0, 1 + i, 1])
}

pub fn config(dir: &TempDir) -> SessionConfig {
    SessionConfig {
        document_path: dir.path().join("review.json"),
        store: LocalStoreConfig {
            path: dir.path().join("backup"),
            ..Default::default()
        },
        snapshot_quiet: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Write `doc` as the session's document file.
pub fn write_doc(dir: &TempDir, doc: &Document) {
    doc.save(dir.path().join("review.json")).unwrap();
}
