//! Live view state, kept apart from the persisted markup.

use crate::markup::NodePath;
use crate::types::{Effort, Priority, TargetKind};
use std::collections::BTreeMap;

/// A materialized image in an image slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageView {
    pub src: String,
    pub visible: bool,
}

/// What a note slot currently shows: its text and the selected buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteView {
    pub content: String,
    pub priority: Option<Priority>,
    pub effort: Option<Effort>,
}

impl NoteView {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.priority.is_none() && self.effort.is_none()
    }
}

/// View state of a whole document, keyed by slot position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewState {
    images: BTreeMap<NodePath, ImageView>,
    notes: BTreeMap<NodePath, NoteView>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self, slot: &NodePath) -> Option<&ImageView> {
        self.images.get(slot)
    }

    pub fn image_mut(&mut self, slot: &NodePath) -> Option<&mut ImageView> {
        self.images.get_mut(slot)
    }

    pub fn set_image(&mut self, slot: NodePath, image: ImageView) {
        self.images.insert(slot, image);
    }

    pub fn remove_image(&mut self, slot: &NodePath) -> Option<ImageView> {
        self.images.remove(slot)
    }

    pub fn note(&self, slot: &NodePath) -> Option<&NoteView> {
        self.notes.get(slot)
    }

    /// The note view of `slot`, created empty on first access.
    pub fn note_mut(&mut self, slot: &NodePath) -> &mut NoteView {
        self.notes.entry(slot.clone()).or_default()
    }

    pub fn set_note(&mut self, slot: NodePath, note: NoteView) {
        self.notes.insert(slot, note);
    }

    pub fn remove_note(&mut self, slot: &NodePath) -> Option<NoteView> {
        self.notes.remove(slot)
    }

    /// Whether the slot already shows something.
    pub fn has_live_content(&self, slot: &NodePath, kind: TargetKind) -> bool {
        match kind {
            TargetKind::Image => self.images.contains_key(slot),
            TargetKind::Note => self.notes.get(slot).is_some_and(|n| !n.is_empty()),
        }
    }

    pub fn images(&self) -> impl Iterator<Item = (&NodePath, &ImageView)> {
        self.images.iter()
    }

    pub fn notes(&self) -> impl Iterator<Item = (&NodePath, &NoteView)> {
        self.notes.iter().filter(|(_, n)| !n.is_empty())
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.notes.clear();
    }
}
