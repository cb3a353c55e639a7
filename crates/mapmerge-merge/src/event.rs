//! Synchronous change notifications for a merge operation.
//!
//! Observers run on the caller's thread, inside the call that raised the
//! event. An event raised while observers are already running is queued and
//! delivered after the current one, so every observer sees events in order
//! and no observer is re-entered.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::action::ActionId;

/// Something that happened to a merge operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeEvent {
    /// A top-level action was added.
    ActionAdded(ActionId),
    /// An action's active state or resolution changed.
    ActionChanged(ActionId),
    /// An action was applied to the live tree. The enclosing transaction
    /// may still roll back.
    ActionApplied(ActionId),
    /// An apply pass committed.
    Applied { actions: usize, memberships: usize },
    /// The merge was finished and its staging cleared.
    Finished,
    /// The merge was aborted and its changes reverted.
    Aborted,
}

/// Handle returned by [`MergeOperation::subscribe`](crate::MergeOperation::subscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&MergeEvent)>;

#[derive(Default)]
pub(crate) struct Observers {
    next_id: Cell<u64>,
    slots: RefCell<Vec<(SubscriptionId, Observer)>>,
    /// Unsubscriptions requested while the slots were checked out.
    dropped: RefCell<Vec<SubscriptionId>>,
    queue: RefCell<VecDeque<MergeEvent>>,
    dispatching: Cell<bool>,
}

impl Observers {
    pub(crate) fn subscribe(&self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(sid, _)| *sid != id);
        if slots.len() == before && self.dispatching.get() {
            self.dropped.borrow_mut().push(id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub(crate) fn emit(&self, event: MergeEvent) {
        self.queue.borrow_mut().push_back(event);
        if self.dispatching.replace(true) {
            return;
        }
        let _dispatch = Dispatch(self);

        loop {
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            let mut checkout = Checkout {
                observers: self,
                running: std::mem::take(&mut *self.slots.borrow_mut()),
            };
            for (_, observer) in checkout.running.iter_mut() {
                observer(&event);
            }
        }
    }
}

/// Clears the dispatching flag, and drops undelivered events if an observer
/// panicked.
struct Dispatch<'a>(&'a Observers);

impl Drop for Dispatch<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.queue.borrow_mut().clear();
        }
        self.0.dispatching.set(false);
    }
}

/// Observers taken out of their slots for one event. Dropping puts them back
/// ahead of any subscribed meanwhile, minus those unsubscribed meanwhile.
struct Checkout<'a> {
    observers: &'a Observers,
    running: Vec<(SubscriptionId, Observer)>,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        let dropped = std::mem::take(&mut *self.observers.dropped.borrow_mut());
        let mut running = std::mem::take(&mut self.running);
        running.retain(|(id, _)| !dropped.contains(id));
        let mut slots = self.observers.slots.borrow_mut();
        let added = std::mem::take(&mut *slots);
        *slots = running;
        slots.extend(added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn observers_receive_events_in_order() {
        let observers = Observers::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        observers.subscribe(Box::new(move |e| sink.borrow_mut().push(e.clone())));

        observers.emit(MergeEvent::ActionAdded(ActionId::new(0)));
        observers.emit(MergeEvent::Finished);
        assert_eq!(
            *seen.borrow(),
            vec![MergeEvent::ActionAdded(ActionId::new(0)), MergeEvent::Finished]
        );
    }

    #[test]
    fn unsubscribed_observer_is_silent() {
        let observers = Observers::default();
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let id = observers.subscribe(Box::new(move |_| sink.set(sink.get() + 1)));

        observers.emit(MergeEvent::Finished);
        observers.unsubscribe(id);
        observers.emit(MergeEvent::Finished);
        assert_eq!(count.get(), 1);
        assert_eq!(observers.len(), 0);
    }

    #[test]
    fn observer_can_unsubscribe_itself() {
        let observers = Rc::new(Observers::default());
        let count = Rc::new(Cell::new(0));
        let own_id = Rc::new(Cell::new(None));

        let handle = Rc::downgrade(&observers);
        let sink = Rc::clone(&count);
        let id_slot = Rc::clone(&own_id);
        let id = observers.subscribe(Box::new(move |_| {
            sink.set(sink.get() + 1);
            if let (Some(observers), Some(id)) = (handle.upgrade(), id_slot.get()) {
                observers.unsubscribe(id);
            }
        }));
        own_id.set(Some(id));

        observers.emit(MergeEvent::Finished);
        observers.emit(MergeEvent::Finished);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn nested_events_are_queued() {
        let observers = Rc::new(Observers::default());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let handle = Rc::downgrade(&observers);
        let sink = Rc::clone(&seen);
        observers.subscribe(Box::new(move |e| {
            sink.borrow_mut().push(e.clone());
            if *e == (MergeEvent::Applied { actions: 1, memberships: 0 }) {
                if let Some(observers) = handle.upgrade() {
                    observers.emit(MergeEvent::Finished);
                }
            }
        }));

        observers.emit(MergeEvent::Applied { actions: 1, memberships: 0 });
        assert_eq!(
            *seen.borrow(),
            vec![
                MergeEvent::Applied { actions: 1, memberships: 0 },
                MergeEvent::Finished
            ]
        );
    }

    #[test]
    fn panicking_observer_does_not_wedge_delivery() {
        let observers = Observers::default();
        let seen = Rc::new(Cell::new(0));
        let armed = Rc::new(Cell::new(true));

        let trip = Rc::clone(&armed);
        observers.subscribe(Box::new(move |_| {
            if trip.replace(false) {
                panic!("observer failed");
            }
        }));
        let sink = Rc::clone(&seen);
        observers.subscribe(Box::new(move |_| sink.set(sink.get() + 1)));

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observers.emit(MergeEvent::Finished);
        }));
        assert!(outcome.is_err());
        assert_eq!(observers.len(), 2);

        observers.emit(MergeEvent::Aborted);
        assert_eq!(seen.get(), 1);
    }
}
