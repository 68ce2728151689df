//! Context-destruction notification.
//!
//! When a rendering context is torn down, the driver invalidates every
//! server handle owned by its share group. Resources register here so
//! their bookkeeping can be reconciled: on notification they drop the
//! affected binding records without attempting deletion.
//!
//! Observers are held weakly; a resource that has already been dropped
//! is swept out on the next notification.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::ShareGroupId;

/// Receives share-group teardown notifications.
pub trait LifecycleObserver: Send + Sync {
    /// The given share group is gone; every handle in it is invalid.
    fn share_group_destroyed(&self, group: ShareGroupId);
}

/// Registry of live resources interested in context teardown.
///
/// One instance per driver backend. Notifications are delivered
/// synchronously on the thread tearing the context down.
#[derive(Default)]
pub struct ContextLifecycle {
    observers: Mutex<Vec<Weak<dyn LifecycleObserver>>>,
}

impl ContextLifecycle {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Each resource subscribes once, lazily,
    /// when its first binding is created.
    pub fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) {
        self.observers.lock().push(observer);
    }

    /// Notify all live observers that `group` has been torn down.
    pub fn notify_destroyed(&self, group: ShareGroupId) {
        // Upgrade under the lock, deliver outside it: observers lock
        // their own state and may subscribe re-entrantly.
        let live: Vec<Arc<dyn LifecycleObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        log::trace!(
            "context lifecycle: share group {:?} destroyed, notifying {} observer(s)",
            group,
            live.len()
        );
        for observer in live {
            observer.share_group_destroyed(group);
        }
    }

    /// Number of live observers, for diagnostics.
    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|weak| weak.strong_count() > 0);
        observers.len()
    }
}

impl std::fmt::Debug for ContextLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLifecycle")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl LifecycleObserver for Counter {
        fn share_group_destroyed(&self, _group: ShareGroupId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notify_reaches_live_observers() {
        let lifecycle = ContextLifecycle::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        lifecycle.subscribe(Arc::downgrade(&counter) as Weak<dyn LifecycleObserver>);

        lifecycle.notify_destroyed(ShareGroupId(1));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_observers_are_swept() {
        let lifecycle = ContextLifecycle::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        lifecycle.subscribe(Arc::downgrade(&counter) as Weak<dyn LifecycleObserver>);
        assert_eq!(lifecycle.observer_count(), 1);

        drop(counter);
        lifecycle.notify_destroyed(ShareGroupId(1));
        assert_eq!(lifecycle.observer_count(), 0);
    }
}
