//! Event bus broadcasting session events to subscribers.

use super::types::{
    AnnotationEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<AnnotationEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the subscriber must be dropped.
    fn try_send(&self, event: AnnotationEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

#[derive(Default)]
struct Inner {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

/// Cheaply cloneable broadcaster; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.inner
            .subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.inner.subscriptions.write().remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(AnnotationEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Send `event` to every matching subscriber. Drops subscribers that
    /// cannot keep up.
    pub fn emit(&self, event: AnnotationEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.inner.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.config.filter.matches(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.inner.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    let _ = sub.sender.try_send(AnnotationEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFilter;
    use crate::types::Collection;
    use std::time::Duration;

    fn failed(key: &str) -> AnnotationEvent {
        AnnotationEvent::BackupWriteFailed {
            collection: Collection::Images,
            key: key.into(),
            error: "disk full".into(),
        }
    }

    fn written(key: &str) -> AnnotationEvent {
        AnnotationEvent::BackupWritten {
            collection: Collection::Notes,
            key: key.into(),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let bus = EventBus::new();
        let handle = bus.subscribe(SubscriptionConfig::default());
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe(handle.id);
        assert_eq!(bus.subscription_count(), 0);
        assert!(matches!(
            handle.recv_timeout(Duration::from_millis(50)).unwrap(),
            AnnotationEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_failures_filter() {
        let bus = EventBus::new();
        let handle = bus.subscribe(SubscriptionConfig {
            filter: EventFilter::failures(),
            ..Default::default()
        });

        bus.emit(written("a"));
        bus.emit(failed("b"));

        assert_eq!(handle.drain(), vec![failed("b")]);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let handle = bus.subscribe(SubscriptionConfig::default());
        bus.clone().emit(written("k"));
        assert_eq!(handle.try_recv().unwrap(), written("k"));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let bus = EventBus::new();
        let _handle = bus.subscribe(SubscriptionConfig {
            buffer_size: 2,
            filter: EventFilter::backup(),
        });

        for i in 0..10 {
            bus.emit(written(&i.to_string()));
        }

        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_filter_excludes_other_groups() {
        let bus = EventBus::new();
        let handle = bus.subscribe(SubscriptionConfig {
            filter: EventFilter::backup(),
            ..Default::default()
        });
        bus.emit(AnnotationEvent::Exported { images: 1, notes: 0 });
        assert!(handle.try_recv().is_err());
    }
}
