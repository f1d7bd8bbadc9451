//! Class and attribute names the review document uses.

pub const PAGE_CARD: &str = "page-card";
pub const BREAKPOINT_SECTION: &str = "breakpoint-assessment";
pub const CATEGORY: &str = "assessment-category";
pub const ITEM: &str = "assessment-item";
pub const IMAGE_CONTAINER: &str = "assessment-image-container";
pub const NOTE_BOX: &str = "suggested-improvement-box";
pub const NOTE_CONTENT: &str = "suggested-improvement-content";
pub const PRIORITY_SECTION: &str = "improvement-priority-section";
pub const PRIORITY_BUTTON: &str = "priority-btn";
pub const EFFORT_SECTION: &str = "improvement-effort-section";
pub const EFFORT_BUTTON: &str = "effort-btn";
/// Marks the selected priority or effort button.
pub const ACTIVE: &str = "active";

pub const ATTR_PAGE: &str = "data-page";
pub const ATTR_BREAKPOINT: &str = "data-breakpoint";
pub const ATTR_CATEGORY: &str = "data-category";
pub const ATTR_PRIORITY: &str = "data-priority";
pub const ATTR_EFFORT: &str = "data-effort";
pub const ATTR_ACTIVE: &str = "data-active";

/// Full encoded image of an image container.
pub const ATTR_IMAGE_SRC: &str = "data-image-src";
pub const ATTR_SAVED_CONTENT: &str = "data-saved-content";
pub const ATTR_SAVED_PRIORITY: &str = "data-saved-priority";
pub const ATTR_SAVED_EFFORT: &str = "data-saved-effort";

/// Every attribute that carries annotation state.
pub const ANNOTATION_ATTRS: [&str; 4] = [
    ATTR_IMAGE_SRC,
    ATTR_SAVED_CONTENT,
    ATTR_SAVED_PRIORITY,
    ATTR_SAVED_EFFORT,
];
