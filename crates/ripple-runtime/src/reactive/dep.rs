#![forbid(unsafe_code)]

//! Dependency notifier.
//!
//! A [`Dep`] is owned by each observed data cell or container. Subscription
//! management beyond this (how a property *read* records a dependency) is the
//! integrating framework's concern; this runtime only guarantees the notify
//! contract: [`Dep::notify`] synchronously invokes every currently-subscribed
//! invalidation callback.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);

type NotifyFn = dyn Fn();

/// Broadcast object for one observed data cell.
pub struct Dep {
    id: u64,
    subscribers: RefCell<Vec<Weak<NotifyFn>>>,
}

/// RAII guard keeping one subscription alive.
///
/// Dropping the guard drops the callback; the dead entry is pruned lazily
/// during the next notification and is never invoked again.
pub struct Subscription {
    _callback: Rc<NotifyFn>,
}

impl Dep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Unique identifier, for tracing.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register an invalidation callback. The callback stays live as long as
    /// the returned [`Subscription`] is held.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let callback: Rc<NotifyFn> = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&callback));
        Subscription {
            _callback: callback,
        }
    }

    /// Number of currently-live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Synchronously invoke every live subscriber, in registration order.
    ///
    /// Callbacks may subscribe or notify re-entrantly; the subscriber list is
    /// snapshotted before any callback runs. Dead entries are pruned after.
    pub fn notify(&self) {
        let snapshot: Vec<Weak<NotifyFn>> = self.subscribers.borrow().clone();
        tracing::trace!(target: "ripple", dep = self.id, subs = snapshot.len(), "notify");
        let mut any_dead = false;
        for weak in &snapshot {
            match weak.upgrade() {
                Some(callback) => callback(),
                None => any_dead = true,
            }
        }
        if any_dead {
            self.subscribers
                .borrow_mut()
                .retain(|w| w.strong_count() > 0);
        }
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
