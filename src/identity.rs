//! Positional identifiers for annotation slots.
//!
//! A slot's identity is `(page, breakpoint, category, index)` read off its
//! position in the document every time it is needed. Nothing is cached, so a
//! structural edit (removing or reordering items) silently changes the index
//! of every later slot of the same kind in that category.

use crate::error::{Result, StoreError};
use crate::markup::classes::*;
use crate::markup::{Document, Element, NodePath};
use crate::types::TargetKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for a context field that could not be resolved.
pub const UNKNOWN: &str = "unknown";

/// Derived identity of one annotatable slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationTarget {
    pub page: String,
    pub breakpoint: String,
    pub category: String,
    /// Ordinal among same-kind slots of the category; `None` if unresolvable.
    pub index: Option<usize>,
    pub kind: TargetKind,
}

impl AnnotationTarget {
    pub fn new(
        kind: TargetKind,
        page: impl Into<String>,
        breakpoint: impl Into<String>,
        category: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            page: page.into(),
            breakpoint: breakpoint.into(),
            category: category.into(),
            index: Some(index),
            kind,
        }
    }

    /// Canonical store key: the four fields joined with `-`.
    pub fn key(&self) -> String {
        let index = match self.index {
            Some(i) => i.to_string(),
            None => UNKNOWN.to_string(),
        };
        format!("{}-{}-{}-{}", self.page, self.breakpoint, self.category, index)
    }

    /// Whether every field resolved to a real value.
    pub fn is_complete(&self) -> bool {
        self.page != UNKNOWN
            && self.breakpoint != UNKNOWN
            && self.category != UNKNOWN
            && self.index.is_some()
    }
}

impl fmt::Display for AnnotationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key())
    }
}

/// A slot of the current document together with its derived identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub path: NodePath,
    pub target: AnnotationTarget,
}

/// The slot kind of an element, if it is a slot at all.
pub fn slot_kind(element: &Element) -> Option<TargetKind> {
    if element.has_class(IMAGE_CONTAINER) {
        Some(TargetKind::Image)
    } else if element.has_class(NOTE_CONTENT) {
        Some(TargetKind::Note)
    } else {
        None
    }
}

/// Derive the identity of the slot at `slot`.
///
/// Context lookups that fail (no page card, no breakpoint section, no category
/// container, missing or empty attribute) become [`UNKNOWN`] for that field.
pub fn derive_target(doc: &Document, slot: &NodePath) -> Result<AnnotationTarget> {
    let element = doc.require(slot)?;
    let kind = slot_kind(element).ok_or_else(|| StoreError::NotASlot(slot.to_string()))?;

    let page = context_attr(doc, slot, PAGE_CARD, ATTR_PAGE);
    let breakpoint = context_attr(doc, slot, BREAKPOINT_SECTION, ATTR_BREAKPOINT);

    let category_path = doc.closest(slot, |e| e.has_class(CATEGORY));
    let (category, index) = match category_path {
        Some(ref cat) => {
            let name = doc
                .get(cat)
                .and_then(|e| e.attr(ATTR_CATEGORY))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(UNKNOWN)
                .to_string();
            let index = doc
                .descendants(cat)
                .into_iter()
                .filter(|(_, e)| slot_kind(e) == Some(kind))
                .position(|(p, _)| &p == slot);
            (name, index)
        }
        None => (UNKNOWN.to_string(), None),
    };

    Ok(AnnotationTarget {
        page,
        breakpoint,
        category,
        index,
        kind,
    })
}

/// Shorthand for `derive_target(doc, slot)?.key()`.
pub fn derive_key(doc: &Document, slot: &NodePath) -> Result<String> {
    Ok(derive_target(doc, slot)?.key())
}

fn context_attr(doc: &Document, from: &NodePath, class: &str, attr: &str) -> String {
    doc.closest(from, |e| e.has_class(class))
        .and_then(|p| doc.get(&p))
        .and_then(|e| e.attr(attr))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Every slot of the document, in document order.
pub fn enumerate_slots(doc: &Document) -> Vec<Slot> {
    doc.walk()
        .into_iter()
        .filter(|(_, e)| slot_kind(e).is_some())
        .filter_map(|(path, _)| {
            derive_target(doc, &path)
                .ok()
                .map(|target| Slot { path, target })
        })
        .collect()
}

/// The slot that currently carries `target`'s identity.
pub fn find_slot(doc: &Document, target: &AnnotationTarget) -> Option<NodePath> {
    let key = target.key();
    enumerate_slots(doc)
        .into_iter()
        .find(|slot| slot.target.kind == target.kind && slot.target.key() == key)
        .map(|slot| slot.path)
}

/// Resolve the slot an interaction refers to.
///
/// Accepts the slot itself, any element inside a note box (such as a
/// priority button), or the enclosing item.
pub fn resolve_slot(doc: &Document, path: &NodePath) -> Result<(NodePath, TargetKind)> {
    let element = doc.require(path)?;
    if let Some(kind) = slot_kind(element) {
        return Ok((path.clone(), kind));
    }

    doc.descendants(&interaction_scope(doc, path)?)
        .into_iter()
        .find_map(|(p, e)| slot_kind(e).map(|kind| (p, kind)))
        .ok_or_else(|| StoreError::NotASlot(path.to_string()))
}

/// Like [`resolve_slot`], but only a slot of `kind` will do.
///
/// An item may hold an image container and a note box side by side; the
/// item path then resolves to whichever of the two the caller asks for.
pub fn resolve_slot_of(doc: &Document, path: &NodePath, kind: TargetKind) -> Result<NodePath> {
    let element = doc.require(path)?;
    if let Some(found) = slot_kind(element) {
        if found != kind {
            return Err(StoreError::NotASlot(format!("{path} is a {found} slot, not {kind}")));
        }
        return Ok(path.clone());
    }

    doc.descendants(&interaction_scope(doc, path)?)
        .into_iter()
        .find(|(_, e)| slot_kind(e) == Some(kind))
        .map(|(p, _)| p)
        .ok_or_else(|| StoreError::NotASlot(format!("no {kind} slot at {path}")))
}

fn interaction_scope(doc: &Document, path: &NodePath) -> Result<NodePath> {
    doc.closest(path, |e| e.has_class(NOTE_BOX))
        .or_else(|| doc.closest(path, |e| e.has_class(ITEM)))
        .ok_or_else(|| StoreError::NotASlot(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::builder::*;
    use crate::markup::Element;

    fn three_item_doc() -> Document {
        document([page(
            "home",
            [breakpoint(
                "1920x1080",
                [category(
                    "layout",
                    [image_item("hero"), image_item("nav"), image_item("footer")],
                )],
            )],
        )])
    }

    fn container_of(item: usize) -> NodePath {
        // body/page/breakpoint/category/item/container
        NodePath::from_indices([0, 0, 0, item, 1])
    }

    #[test]
    fn test_derive_key_format() {
        let doc = three_item_doc();
        let target = derive_target(&doc, &container_of(2)).unwrap();
        assert_eq!(target.kind, TargetKind::Image);
        assert_eq!(target.key(), "home-1920x1080-layout-2");
        assert!(target.is_complete());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let doc = three_item_doc();
        let first = derive_target(&doc, &container_of(1)).unwrap();
        let second = derive_target(&doc, &container_of(1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_index_shifts_after_sibling_removal() {
        let mut doc = three_item_doc();
        let before = derive_key(&doc, &container_of(1)).unwrap();
        assert_eq!(before, "home-1920x1080-layout-1");

        doc.remove(&NodePath::from_indices([0, 0, 0, 0])).unwrap();

        // The former item 1 now sits at position 0 and takes over index 0.
        let after = derive_key(&doc, &container_of(0)).unwrap();
        assert_eq!(after, "home-1920x1080-layout-0");
        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_context_degrades_to_unknown() {
        let doc = document([Element::new("div").with_child(image_item("orphan"))]);
        let target = derive_target(&doc, &NodePath::from_indices([0, 0, 1])).unwrap();
        assert_eq!(target.page, UNKNOWN);
        assert_eq!(target.breakpoint, UNKNOWN);
        assert_eq!(target.category, UNKNOWN);
        assert_eq!(target.index, None);
        assert_eq!(target.key(), "unknown-unknown-unknown-unknown");
        assert!(!target.is_complete());
    }

    #[test]
    fn test_empty_attribute_degrades_to_unknown() {
        let doc = document([page("", [breakpoint("768", [category("nav", [image_item("a")])])])]);
        let key = derive_key(&doc, &NodePath::from_indices([0, 0, 0, 0, 1])).unwrap();
        assert_eq!(key, "unknown-768-nav-0");
    }

    #[test]
    fn test_indices_are_per_kind() {
        let doc = document([page(
            "home",
            [breakpoint(
                "375",
                [category(
                    "opportunity",
                    [image_item("a"), note_item("b"), image_item("c"), note_item("d")],
                )],
            )],
        )]);
        let keys: Vec<String> = enumerate_slots(&doc)
            .iter()
            .map(|s| s.target.to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "image:home-375-opportunity-0",
                "note:home-375-opportunity-0",
                "image:home-375-opportunity-1",
                "note:home-375-opportunity-1",
            ]
        );
    }

    #[test]
    fn test_not_a_slot() {
        let doc = three_item_doc();
        let err = derive_target(&doc, &NodePath::from_indices([0, 0])).unwrap_err();
        assert!(matches!(err, StoreError::NotASlot(_)));
    }

    #[test]
    fn test_resolve_slot_from_button_and_item() {
        let doc = document([page("p", [breakpoint("b", [category("c", [note_item("n")])])])]);
        // item/box/priority-section/first button
        let button = NodePath::from_indices([0, 0, 0, 0, 1, 1, 0]);
        let (slot, kind) = resolve_slot(&doc, &button).unwrap();
        assert_eq!(kind, TargetKind::Note);
        assert_eq!(slot, NodePath::from_indices([0, 0, 0, 0, 1, 0]));

        let item = NodePath::from_indices([0, 0, 0, 0]);
        assert_eq!(resolve_slot(&doc, &item).unwrap().0, slot);
    }

    #[test]
    fn test_resolve_slot_of_mixed_item() {
        // One item carrying both an image container and a note box.
        let mut mixed = image_item("hero");
        for child in note_item("hero").children {
            if child.has_class(NOTE_BOX) {
                mixed = mixed.with_child(child);
            }
        }
        let doc = document([page("p", [breakpoint("b", [category("c", [mixed])])])]);
        let item = NodePath::from_indices([0, 0, 0, 0]);

        let image = resolve_slot_of(&doc, &item, TargetKind::Image).unwrap();
        assert_eq!(image, NodePath::from_indices([0, 0, 0, 0, 1]));
        let note = resolve_slot_of(&doc, &item, TargetKind::Note).unwrap();
        assert_eq!(note, NodePath::from_indices([0, 0, 0, 0, 2, 0]));

        // A slot addressed directly must already be the right kind.
        assert!(matches!(
            resolve_slot_of(&doc, &image, TargetKind::Note),
            Err(StoreError::NotASlot(_))
        ));
        // Inside the note box, only the note is in scope.
        let button = NodePath::from_indices([0, 0, 0, 0, 2, 1, 0]);
        assert!(resolve_slot_of(&doc, &button, TargetKind::Image).is_err());
        assert_eq!(resolve_slot_of(&doc, &button, TargetKind::Note).unwrap(), note);
    }

    #[test]
    fn test_find_slot_by_target() {
        let doc = three_item_doc();
        let target = AnnotationTarget::new(TargetKind::Image, "home", "1920x1080", "layout", 1);
        assert_eq!(find_slot(&doc, &target), Some(container_of(1)));

        let note = AnnotationTarget::new(TargetKind::Note, "home", "1920x1080", "layout", 1);
        assert_eq!(find_slot(&doc, &note), None);
    }
}
