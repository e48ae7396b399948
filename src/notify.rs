use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;

use tracing::trace;

use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub resource: Resource,
}

struct Observer {
    resource: Resource,
    notify_for_descendants: bool,
    tx: Sender<ChangeEvent>,
}

impl Observer {
    fn wants(&self, changed: Resource) -> bool {
        if self.notify_for_descendants {
            self.resource.contains(changed)
        } else {
            self.resource == changed
        }
    }
}

/// Fans change events out to everyone observing the changed resource.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: Mutex<Vec<Observer>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, resource: Resource, notify_for_descendants: bool) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.lock_observers().push(Observer {
            resource,
            notify_for_descendants,
            tx,
        });
        Subscription { rx }
    }

    /// Returns how many observers received the event.
    pub fn notify_change(&self, resource: Resource) -> usize {
        let event = ChangeEvent { resource };
        let mut delivered = 0;
        self.lock_observers().retain(|observer| {
            if !observer.wants(resource) {
                return true;
            }
            match observer.tx.send(event) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        trace!(%resource, delivered, "change notification");
        delivered
    }

    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.lock_observers().len()
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of an observer registration. Dropping it unregisters the
/// observer on the next notification.
pub struct Subscription {
    rx: Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<ChangeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Discards pending events and returns how many there were.
    pub fn drain(&self) -> usize {
        std::iter::from_fn(|| self.try_next()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::ChangeNotifier;
    use crate::resource::Resource;

    #[test]
    fn item_changes_reach_collection_observers_with_descendants() {
        let notifier = ChangeNotifier::new();
        let list = notifier.register(Resource::Tasks, true);
        let exact_list = notifier.register(Resource::Tasks, false);
        let detail = notifier.register(Resource::Task(3), false);
        let other = notifier.register(Resource::Task(4), false);

        assert_eq!(notifier.notify_change(Resource::Task(3)), 2);
        assert_eq!(list.try_next().map(|e| e.resource), Some(Resource::Task(3)));
        assert_eq!(detail.try_next().map(|e| e.resource), Some(Resource::Task(3)));
        assert!(exact_list.try_next().is_none());
        assert!(other.try_next().is_none());
    }

    #[test]
    fn collection_changes_do_not_reach_item_observers() {
        let notifier = ChangeNotifier::new();
        let list = notifier.register(Resource::Tasks, false);
        let detail = notifier.register(Resource::Task(1), true);

        notifier.notify_change(Resource::Tasks);
        assert_eq!(list.drain(), 1);
        assert_eq!(detail.drain(), 0);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let notifier = ChangeNotifier::new();
        let kept = notifier.register(Resource::Tasks, true);
        let dropped = notifier.register(Resource::Tasks, true);
        drop(dropped);

        assert_eq!(notifier.observer_count(), 2);
        assert_eq!(notifier.notify_change(Resource::Tasks), 1);
        assert_eq!(notifier.observer_count(), 1);
        assert_eq!(kept.drain(), 1);
    }
}
