//! Constructors for the recognized review-document structure.

use super::classes::*;
use super::document::{Document, Element};
use crate::types::{Effort, Priority, TargetKind};

/// Root of a review document.
pub fn document(pages: impl IntoIterator<Item = Element>) -> Document {
    Document::new(Element::new("body").with_children(pages))
}

pub fn page(name: &str, breakpoints: impl IntoIterator<Item = Element>) -> Element {
    Element::new("div")
        .with_class(PAGE_CARD)
        .with_attr(ATTR_PAGE, name)
        .with_children(breakpoints)
}

pub fn breakpoint(label: &str, categories: impl IntoIterator<Item = Element>) -> Element {
    Element::new("div")
        .with_class(BREAKPOINT_SECTION)
        .with_attr(ATTR_BREAKPOINT, label)
        .with_children(categories)
}

pub fn category(name: &str, items: impl IntoIterator<Item = Element>) -> Element {
    Element::new("div")
        .with_class(CATEGORY)
        .with_attr(ATTR_CATEGORY, name)
        .with_children(items)
}

/// Checklist item with an empty image container.
pub fn image_item(label: &str) -> Element {
    Element::new("div")
        .with_class(ITEM)
        .with_child(Element::new("p").with_text(label))
        .with_child(Element::new("div").with_class(IMAGE_CONTAINER))
}

/// Improvement box with an empty content element and priority/effort buttons.
pub fn note_item(label: &str) -> Element {
    let priorities = Priority::ALL.iter().map(|p| {
        Element::new("button")
            .with_class(PRIORITY_BUTTON)
            .with_attr(ATTR_PRIORITY, p.as_str())
            .with_text(p.as_str())
    });
    let efforts = Effort::ALL.iter().map(|e| {
        Element::new("button")
            .with_class(EFFORT_BUTTON)
            .with_attr(ATTR_EFFORT, e.as_str())
            .with_text(e.as_str())
    });

    Element::new("div")
        .with_class(ITEM)
        .with_child(Element::new("p").with_text(label))
        .with_child(
            Element::new("div")
                .with_class(NOTE_BOX)
                .with_child(Element::new("div").with_class(NOTE_CONTENT))
                .with_child(
                    Element::new("div")
                        .with_class(PRIORITY_SECTION)
                        .with_children(priorities),
                )
                .with_child(
                    Element::new("div")
                        .with_class(EFFORT_SECTION)
                        .with_children(efforts),
                ),
        )
}

pub fn item(kind: TargetKind, label: &str) -> Element {
    match kind {
        TargetKind::Image => image_item(label),
        TargetKind::Note => note_item(label),
    }
}
