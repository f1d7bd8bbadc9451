//! The review document as an attribute-bag tree.
//!
//! Annotation state is stored as attributes on the document's own elements,
//! so the document file doubles as the primary persistence format. The tree
//! is plain data, independent of any live view, which keeps every operation
//! testable headlessly.

pub mod builder;
pub mod classes;
mod document;

pub use document::{AttributeBag, Document, Element, NodePath};
