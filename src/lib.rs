//! # Annotation Store
//!
//! Dual persistence for review annotations: pasted screenshots, improvement
//! notes, priority and effort ratings attached to a structured review
//! document.
//!
//! ## Core Concepts
//!
//! - **Inline markup**: annotation state written as attributes on the
//!   document itself, so a saved document is self-contained
//! - **Local backup**: an asynchronous key-value store that survives when the
//!   document file is lost or stale
//! - **Positional identity**: each slot is keyed by
//!   `page-breakpoint-category-index`, derived from the document every time
//! - **Reconciliation**: inline state wins on load; the backup only fills
//!   gaps, and overwrites inline state only on an explicit export
//!
//! ## Example
//!
//! ```ignore
//! use annotation_store::{Session, SessionConfig};
//!
//! let mut session = Session::open(SessionConfig {
//!     document_path: "./review.json".into(),
//!     ..Default::default()
//! })?;
//! session.reconcile_on_load().await;
//!
//! // Inline write now, backup write in the background.
//! session.edit_note(&slot, "Add a call to action")?;
//! session.run_pending_snapshot().await;
//! ```

pub mod error;
pub mod events;
pub mod identity;
pub mod inline;
pub mod local;
pub mod markup;
pub mod media;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod view;

// Re-exports
pub use error::{Result, StoreError};
pub use events::{
    AnnotationEvent, DropReason, EventBus, EventFilter, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};
pub use identity::{derive_key, derive_target, enumerate_slots, AnnotationTarget, Slot, UNKNOWN};
pub use local::{Availability, LocalStore, LocalStoreConfig, SCHEMA_VERSION};
pub use markup::{Document, Element, NodePath};
pub use reconcile::{ExportReport, LoadReport, ReconcilePhase, Reconciler, Recovery};
pub use session::{BackupSummary, Session, SessionConfig};
pub use snapshot::SnapshotScheduler;
pub use types::*;
pub use view::{ImageView, NoteView, ViewState};
