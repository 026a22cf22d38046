//! Change listener registry behind
//! [`DisplayLayer::on_did_change_sync`](crate::DisplayLayer::on_did_change_sync).

use crate::change_coalescer::DisplayChange;
use rustc_hash::FxHashMap;
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};
use tracing::trace;

type Listener = Box<dyn FnMut(&[DisplayChange])>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// A listener is `None` while it is being called.
    listeners: FxHashMap<u64, Option<Listener>>,
}

/// Shared handle to the registered listeners.
#[derive(Clone, Default)]
pub(crate) struct ListenerSet {
    registry: Rc<RefCell<Registry>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl FnMut(&[DisplayChange]) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Some(Box::new(listener)));
        Subscription {
            registry: Rc::downgrade(&self.registry),
            id,
            detached: false,
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().listeners.len()
    }

    pub fn clear(&self) {
        self.registry.borrow_mut().listeners.clear();
    }

    /// Calls every listener registered before the call, in subscription order. Listeners
    /// removed by an earlier listener are skipped.
    pub fn emit(&self, changes: &[DisplayChange]) {
        if changes.is_empty() {
            return;
        }
        let mut ids: Vec<u64> = self.registry.borrow().listeners.keys().copied().collect();
        ids.sort_unstable();
        trace!(
            "ListenerSet.emit: {} change(s) to {} listener(s)",
            changes.len(),
            ids.len()
        );

        for id in ids {
            let listener = self
                .registry
                .borrow_mut()
                .listeners
                .get_mut(&id)
                .and_then(Option::take);
            let Some(mut listener) = listener else {
                continue;
            };
            listener(changes);
            if let Some(slot) = self.registry.borrow_mut().listeners.get_mut(&id) {
                *slot = Some(listener);
            }
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    id: u64,
    detached: bool,
}

impl Subscription {
    /// Unsubscribes now.
    pub fn dispose(self) {}

    /// Keeps the listener registered for the lifetime of the display layer.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().listeners.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::DisplayPoint;

    fn change() -> DisplayChange {
        DisplayChange {
            start: DisplayPoint::ZERO,
            old_extent: DisplayPoint::new(1, 0),
            new_extent: DisplayPoint::new(1, 0),
        }
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let listeners = ListenerSet::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let subscription = listeners.subscribe(move |_| *counter.borrow_mut() += 1);

        listeners.emit(&[change()]);
        drop(subscription);
        listeners.emit(&[change()]);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn disposed_subscription_stops_delivery() {
        let listeners = ListenerSet::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let subscription = listeners.subscribe(move |_| *counter.borrow_mut() += 1);
        let _other = listeners.subscribe(|_| {});

        listeners.emit(&[change()]);
        subscription.dispose();
        assert_eq!(listeners.len(), 1);
        listeners.emit(&[change()]);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn detached_listeners_stay_registered() {
        let listeners = ListenerSet::new();
        listeners.subscribe(|_| {}).detach();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn listener_removed_during_delivery_is_skipped() {
        let listeners = ListenerSet::new();
        let second_calls = Rc::new(RefCell::new(0));
        let held: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let held_in_first = held.clone();
        listeners
            .subscribe(move |_| {
                held_in_first.borrow_mut().take();
            })
            .detach();
        let counter = second_calls.clone();
        *held.borrow_mut() = Some(listeners.subscribe(move |_| *counter.borrow_mut() += 1));

        listeners.emit(&[change()]);
        assert_eq!(*second_calls.borrow(), 0);
    }

    #[test]
    fn listener_added_during_delivery_waits_for_next_change() {
        let listeners = ListenerSet::new();
        let added_calls = Rc::new(RefCell::new(0));
        let inner = listeners.clone();
        let counter = added_calls.clone();
        let mut added = false;
        listeners
            .subscribe(move |_| {
                if !added {
                    added = true;
                    let counter = counter.clone();
                    inner.subscribe(move |_| *counter.borrow_mut() += 1).detach();
                }
            })
            .detach();

        listeners.emit(&[change()]);
        assert_eq!(*added_calls.borrow(), 0);
        listeners.emit(&[change()]);
        assert_eq!(*added_calls.borrow(), 1);
    }
}
