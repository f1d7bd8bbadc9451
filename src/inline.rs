//! Annotation state stored as attributes on the document itself.
//!
//! Writes are synchronous and land directly in the markup tree. Reads replay
//! attributes into [`ViewState`], skipping slots that already show something
//! unless the caller asks to overwrite.

use crate::error::Result;
use crate::identity::slot_kind;
use crate::markup::classes::*;
use crate::markup::{Document, NodePath};
use crate::types::{Effort, NoteRecord, Priority, TargetKind};
use crate::view::{ImageView, NoteView, ViewState};
use tracing::warn;

const STYLE_HIDDEN: &str = "display: none";
const STYLE_SHOWN: &str = "display: block";

/// Note fields as saved on a note content element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedNote {
    pub content: String,
    pub priority: Option<Priority>,
    pub effort: Option<Effort>,
}

impl SavedNote {
    pub fn into_record(self, id: String) -> NoteRecord {
        NoteRecord {
            id,
            content: self.content,
            priority: self.priority,
            effort: self.effort,
        }
    }
}

impl From<&NoteRecord> for SavedNote {
    fn from(record: &NoteRecord) -> Self {
        Self {
            content: record.content.clone(),
            priority: record.priority,
            effort: record.effort,
        }
    }
}

pub fn read_image(doc: &Document, slot: &NodePath) -> Option<String> {
    doc.get(slot)
        .and_then(|e| e.attr(ATTR_IMAGE_SRC))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn write_image(doc: &mut Document, slot: &NodePath, data: &str) -> Result<()> {
    doc.require_mut(slot)?.attrs.set(ATTR_IMAGE_SRC, data);
    Ok(())
}

/// Drop the image attribute. Returns whether one was present.
pub fn remove_image(doc: &mut Document, slot: &NodePath) -> Result<bool> {
    Ok(doc.require_mut(slot)?.attrs.remove(ATTR_IMAGE_SRC).is_some())
}

/// Whether the image container is shown. Containers are shown unless styled hidden.
pub fn image_visible(doc: &Document, slot: &NodePath) -> bool {
    !doc.get(slot)
        .and_then(|e| e.attr("style"))
        .is_some_and(|style| style.replace(' ', "").contains("display:none"))
}

pub fn set_image_visible(doc: &mut Document, slot: &NodePath, visible: bool) -> Result<()> {
    let style = if visible { STYLE_SHOWN } else { STYLE_HIDDEN };
    doc.require_mut(slot)?.attrs.set("style", style);
    Ok(())
}

/// Saved note fields, if any of the three attributes is present.
pub fn read_note(doc: &Document, slot: &NodePath) -> Option<SavedNote> {
    let element = doc.get(slot)?;
    let content = element.attr(ATTR_SAVED_CONTENT);
    let priority = element.attr(ATTR_SAVED_PRIORITY);
    let effort = element.attr(ATTR_SAVED_EFFORT);
    if content.is_none() && priority.is_none() && effort.is_none() {
        return None;
    }

    Some(SavedNote {
        content: content.unwrap_or_default().to_string(),
        priority: priority.and_then(|v| parse_choice(slot, ATTR_SAVED_PRIORITY, v)),
        effort: effort.and_then(|v| parse_choice(slot, ATTR_SAVED_EFFORT, v)),
    })
}

fn parse_choice<T: std::str::FromStr<Err = String>>(slot: &NodePath, attr: &str, value: &str) -> Option<T> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return None;
    }
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(slot = %slot, attr, error = %e, "ignoring saved value");
            None
        }
    }
}

pub fn write_note_content(doc: &mut Document, slot: &NodePath, content: &str) -> Result<()> {
    doc.require_mut(slot)?.attrs.set(ATTR_SAVED_CONTENT, content);
    Ok(())
}

pub fn write_note_priority(doc: &mut Document, slot: &NodePath, priority: Option<Priority>) -> Result<()> {
    let attrs = &mut doc.require_mut(slot)?.attrs;
    match priority {
        Some(p) => attrs.set(ATTR_SAVED_PRIORITY, p.as_str()),
        None => attrs.remove(ATTR_SAVED_PRIORITY),
    };
    mark_selected(doc, slot, PRIORITY_BUTTON, ATTR_PRIORITY, priority.map(Priority::as_str));
    Ok(())
}

pub fn write_note_effort(doc: &mut Document, slot: &NodePath, effort: Option<Effort>) -> Result<()> {
    let attrs = &mut doc.require_mut(slot)?.attrs;
    match effort {
        Some(e) => attrs.set(ATTR_SAVED_EFFORT, e.as_str()),
        None => attrs.remove(ATTR_SAVED_EFFORT),
    };
    mark_selected(doc, slot, EFFORT_BUTTON, ATTR_EFFORT, effort.map(Effort::as_str));
    Ok(())
}

/// Put the active marker on the button whose `attr` equals `value` and take
/// it off its siblings. `None` clears every button of `class`.
fn mark_selected(doc: &mut Document, slot: &NodePath, class: &str, attr: &str, value: Option<&str>) {
    let Some(note_box) = doc.closest(slot, |e| e.has_class(NOTE_BOX)) else {
        return;
    };
    let buttons: Vec<NodePath> = doc
        .descendants(&note_box)
        .into_iter()
        .filter(|(_, e)| e.has_class(class))
        .map(|(path, _)| path)
        .collect();

    for path in buttons {
        let Some(button) = doc.get_mut(&path) else {
            continue;
        };
        if value.is_some() && button.attr(attr) == value {
            button.attrs.add_class(ACTIVE);
            button.attrs.set(ATTR_ACTIVE, "true");
        } else {
            button.attrs.remove_class(ACTIVE);
            button.attrs.remove(ATTR_ACTIVE);
        }
    }
}

/// Write all three note fields.
pub fn write_note(doc: &mut Document, slot: &NodePath, note: &SavedNote) -> Result<()> {
    write_note_content(doc, slot, &note.content)?;
    write_note_priority(doc, slot, note.priority)?;
    write_note_effort(doc, slot, note.effort)
}

/// Drop every saved note attribute. Returns whether any was present.
pub fn remove_note(doc: &mut Document, slot: &NodePath) -> Result<bool> {
    let attrs = &mut doc.require_mut(slot)?.attrs;
    let mut removed = false;
    for attr in [ATTR_SAVED_CONTENT, ATTR_SAVED_PRIORITY, ATTR_SAVED_EFFORT] {
        removed |= attrs.remove(attr).is_some();
    }
    mark_selected(doc, slot, PRIORITY_BUTTON, ATTR_PRIORITY, None);
    mark_selected(doc, slot, EFFORT_BUTTON, ATTR_EFFORT, None);
    Ok(removed)
}

/// Whether the slot carries inline state of its kind.
pub fn has_inline_state(doc: &Document, slot: &NodePath, kind: TargetKind) -> bool {
    match kind {
        TargetKind::Image => read_image(doc, slot).is_some(),
        TargetKind::Note => read_note(doc, slot).is_some(),
    }
}

/// Remove every annotation attribute from the document. Returns how many.
pub fn strip_annotations(doc: &mut Document) -> usize {
    let slots = doc.find_all(|e| slot_kind(e).is_some());
    let mut removed = 0;
    for slot in slots {
        if let Some(element) = doc.get_mut(&slot) {
            for attr in ANNOTATION_ATTRS {
                if element.attrs.remove(attr).is_some() {
                    removed += 1;
                }
            }
        }
    }
    for button in doc.find_all(|e| e.has_class(PRIORITY_BUTTON) || e.has_class(EFFORT_BUTTON)) {
        if let Some(element) = doc.get_mut(&button) {
            element.attrs.remove_class(ACTIVE);
            element.attrs.remove(ATTR_ACTIVE);
        }
    }
    removed
}

/// The priority button for `value` inside the note box of `slot`.
pub fn priority_button(doc: &Document, slot: &NodePath, value: Priority) -> Option<NodePath> {
    find_button(doc, slot, PRIORITY_BUTTON, ATTR_PRIORITY, value.as_str())
}

/// The effort button for `value` inside the note box of `slot`.
pub fn effort_button(doc: &Document, slot: &NodePath, value: Effort) -> Option<NodePath> {
    find_button(doc, slot, EFFORT_BUTTON, ATTR_EFFORT, value.as_str())
}

fn find_button(doc: &Document, slot: &NodePath, class: &str, attr: &str, value: &str) -> Option<NodePath> {
    let note_box = doc.closest(slot, |e| e.has_class(NOTE_BOX))?;
    doc.descendants(&note_box)
        .into_iter()
        .find(|(_, e)| e.has_class(class) && e.attr(attr) == Some(value))
        .map(|(path, _)| path)
}

/// Show the inline image of `slot` in the view.
///
/// Returns whether the view changed. Without `overwrite`, a slot that already
/// shows an image is left alone.
pub fn materialize_image(doc: &Document, view: &mut ViewState, slot: &NodePath, overwrite: bool) -> bool {
    if !overwrite && view.has_live_content(slot, TargetKind::Image) {
        return false;
    }
    let Some(src) = read_image(doc, slot) else {
        return false;
    };
    view.set_image(
        slot.clone(),
        ImageView {
            src,
            visible: image_visible(doc, slot),
        },
    );
    true
}

/// Show the inline note of `slot` in the view, selecting its buttons.
///
/// A saved priority or effort without a matching button in the note box is
/// not selected.
pub fn materialize_note(doc: &Document, view: &mut ViewState, slot: &NodePath, overwrite: bool) -> bool {
    if !overwrite && view.has_live_content(slot, TargetKind::Note) {
        return false;
    }
    let Some(saved) = read_note(doc, slot) else {
        return false;
    };

    let priority = saved.priority.filter(|p| {
        let found = priority_button(doc, slot, *p).is_some();
        if !found {
            warn!(slot = %slot, priority = %p, "no button for saved priority");
        }
        found
    });
    let effort = saved.effort.filter(|e| {
        let found = effort_button(doc, slot, *e).is_some();
        if !found {
            warn!(slot = %slot, effort = %e, "no button for saved effort");
        }
        found
    });

    view.set_note(
        slot.clone(),
        NoteView {
            content: saved.content,
            priority,
            effort,
        },
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::builder::*;
    use crate::markup::Element;

    fn doc() -> Document {
        document([page(
            "home",
            [breakpoint("1920x1080", [category("opportunity", [image_item("hero"), note_item("cta")])])],
        )])
    }

    fn image_slot() -> NodePath {
        NodePath::from_indices([0, 0, 0, 0, 1])
    }

    fn note_slot() -> NodePath {
        NodePath::from_indices([0, 0, 0, 1, 1, 0])
    }

    #[test]
    fn test_image_write_and_materialize() {
        let mut doc = doc();
        let mut view = ViewState::new();
        write_image(&mut doc, &image_slot(), "data:image/png;base64,AA").unwrap();

        assert!(materialize_image(&doc, &mut view, &image_slot(), false));
        let shown = view.image(&image_slot()).unwrap();
        assert_eq!(shown.src, "data:image/png;base64,AA");
        assert!(shown.visible);
    }

    #[test]
    fn test_materialize_does_not_replace_live_content() {
        let mut doc = doc();
        let mut view = ViewState::new();
        view.set_image(
            image_slot(),
            ImageView {
                src: "live".into(),
                visible: true,
            },
        );
        write_image(&mut doc, &image_slot(), "inline").unwrap();

        assert!(!materialize_image(&doc, &mut view, &image_slot(), false));
        assert_eq!(view.image(&image_slot()).unwrap().src, "live");

        assert!(materialize_image(&doc, &mut view, &image_slot(), true));
        assert_eq!(view.image(&image_slot()).unwrap().src, "inline");
    }

    #[test]
    fn test_hidden_style_survives_materialize() {
        let mut doc = doc();
        let mut view = ViewState::new();
        write_image(&mut doc, &image_slot(), "img").unwrap();
        set_image_visible(&mut doc, &image_slot(), false).unwrap();
        materialize_image(&doc, &mut view, &image_slot(), false);
        assert!(!view.image(&image_slot()).unwrap().visible);
    }

    #[test]
    fn test_note_write_and_materialize() {
        let mut doc = doc();
        let mut view = ViewState::new();
        let saved = SavedNote {
            content: "Add CTA".into(),
            priority: Some(Priority::P1),
            effort: Some(Effort::S),
        };
        write_note(&mut doc, &note_slot(), &saved).unwrap();
        assert_eq!(read_note(&doc, &note_slot()), Some(saved));

        assert!(materialize_note(&doc, &mut view, &note_slot(), false));
        let note = view.note(&note_slot()).unwrap();
        assert_eq!(note.content, "Add CTA");
        assert_eq!(note.priority, Some(Priority::P1));
        assert_eq!(note.effort, Some(Effort::S));
    }

    #[test]
    fn test_unknown_saved_priority_is_ignored() {
        let mut doc = doc();
        let element = doc.get_mut(&note_slot()).unwrap();
        element.attrs.set(ATTR_SAVED_CONTENT, "text");
        element.attrs.set(ATTR_SAVED_PRIORITY, "P7");
        element.attrs.set(ATTR_SAVED_EFFORT, "none");

        let saved = read_note(&doc, &note_slot()).unwrap();
        assert_eq!(saved.content, "text");
        assert_eq!(saved.priority, None);
        assert_eq!(saved.effort, None);
    }

    #[test]
    fn test_priority_without_button_is_not_selected() {
        // Note content outside any note box has no buttons to select.
        let mut doc = document([page(
            "p",
            [breakpoint(
                "b",
                [category(
                    "c",
                    [Element::new("div").with_class(NOTE_CONTENT)],
                )],
            )],
        )]);
        let slot = NodePath::from_indices([0, 0, 0, 0]);
        write_note(
            &mut doc,
            &slot,
            &SavedNote {
                content: "x".into(),
                priority: Some(Priority::P2),
                effort: None,
            },
        )
        .unwrap();

        let mut view = ViewState::new();
        assert!(materialize_note(&doc, &mut view, &slot, false));
        assert_eq!(view.note(&slot).unwrap().priority, None);
    }

    #[test]
    fn test_strip_annotations() {
        let mut doc = doc();
        write_image(&mut doc, &image_slot(), "img").unwrap();
        write_note_content(&mut doc, &note_slot(), "text").unwrap();
        write_note_priority(&mut doc, &note_slot(), Some(Priority::P3)).unwrap();

        assert_eq!(strip_annotations(&mut doc), 3);
        assert!(!has_inline_state(&doc, &image_slot(), TargetKind::Image));
        assert!(!has_inline_state(&doc, &note_slot(), TargetKind::Note));
    }

    #[test]
    fn test_selected_buttons_carry_active_marker() {
        let mut doc = doc();
        // note item/box/priority section
        let priorities = NodePath::from_indices([0, 0, 0, 1, 1, 1]);
        let button = |doc: &Document, k: usize| doc.get(&priorities.child(k)).unwrap().clone();

        write_note_priority(&mut doc, &note_slot(), Some(Priority::P1)).unwrap();
        write_note_priority(&mut doc, &note_slot(), Some(Priority::P3)).unwrap();
        assert!(!button(&doc, 0).has_class(ACTIVE));
        assert!(button(&doc, 0).attr(ATTR_ACTIVE).is_none());
        assert!(button(&doc, 2).has_class(ACTIVE));
        assert_eq!(button(&doc, 2).attr(ATTR_ACTIVE), Some("true"));
        assert!(button(&doc, 2).has_class(PRIORITY_BUTTON));

        write_note_effort(&mut doc, &note_slot(), Some(Effort::M)).unwrap();
        let effort = doc.get(&NodePath::from_indices([0, 0, 0, 1, 1, 2, 1])).unwrap();
        assert!(effort.has_class(ACTIVE));

        remove_note(&mut doc, &note_slot()).unwrap();
        assert!(!button(&doc, 2).has_class(ACTIVE));
        assert!(doc.find_all(|e| e.has_class(ACTIVE)).is_empty());
    }

    #[test]
    fn test_clearing_priority_removes_attribute() {
        let mut doc = doc();
        write_note_priority(&mut doc, &note_slot(), Some(Priority::P2)).unwrap();
        write_note_priority(&mut doc, &note_slot(), None).unwrap();
        assert!(doc.get(&note_slot()).unwrap().attr(ATTR_SAVED_PRIORITY).is_none());
    }
}
