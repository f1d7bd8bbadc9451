//! In-process event bus for annotation sessions.
//!
//! Backup writes are fire-and-forget, so their outcome is reported here
//! (and through `tracing`) instead of to the caller. Subscribers get bounded
//! buffers; a subscriber whose buffer fills up is dropped.
//!
//! # Example
//!
//! ```ignore
//! let failures = session.subscribe(EventFilter::failures());
//!
//! for event in failures.drain() {
//!     eprintln!("annotation failure: {:?}", event);
//! }
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{
    AnnotationEvent, DropReason, EventFilter, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};
