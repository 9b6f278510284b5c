#![forbid(unsafe_code)]

//! Collaborator contracts consumed by the runtime.
//!
//! Ripple orchestrates *when* derived work re-runs; the work itself lives
//! behind these traits. A framework integrating the runtime implements
//! [`Watch`] for its computation units, [`Component`] for owning instances,
//! and [`Consumer`] for anything that requests deferred units.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Watch id allocation ─────────────────────────────────────────────────────

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next watcher id.
///
/// Ids strictly increase with creation order, so id ordering is creation
/// ordering — the scheduler relies on this to run parents before children and
/// user watchers before a component's render watcher.
#[must_use]
pub fn next_watch_id() -> u64 {
    NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Watch ───────────────────────────────────────────────────────────────────

/// A unit of derived computation that re-runs when its tracked data changes.
///
/// The scheduler never owns a watcher's liveness: a watcher whose owner has
/// been destroyed must make its own [`run`](Watch::run) a no-op, because the
/// scheduler will still invoke it if it was queued before destruction.
pub trait Watch {
    /// Ordering key. Must come from [`next_watch_id`] (or otherwise strictly
    /// increase with creation order).
    fn id(&self) -> u64;

    /// Hook invoked immediately before [`run`](Watch::run) during a flush.
    fn before(&self) {}

    /// Perform the recomputation. May synchronously re-enqueue watchers
    /// (including itself) into the scheduler.
    fn run(&self);

    /// Whether this is a user-declared watcher (affects diagnostics only).
    fn is_user(&self) -> bool {
        false
    }

    /// The user expression, for diagnostics. Empty for render watchers.
    fn expression(&self) -> &str {
        ""
    }

    /// The owning component instance, if any. The scheduler uses this only
    /// for the post-flush updated pass; it never keeps the owner alive.
    fn owner(&self) -> Option<Rc<dyn Component>> {
        None
    }
}

// ─── Component ───────────────────────────────────────────────────────────────

/// Lifecycle phases this runtime invokes on components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The component was (re-)activated during a flush.
    Activated,
    /// The component's render watcher ran during a flush.
    Updated,
}

/// Contract for a component instance as seen by the scheduler.
///
/// `call_hook` and `activate` are assumed to be no-ops when the instance has
/// no handler registered or is already destroyed.
pub trait Component {
    /// Whether the instance is currently mounted.
    fn is_mounted(&self) -> bool;

    /// Whether the instance has been destroyed.
    fn is_destroyed(&self) -> bool;

    /// Id of this instance's designated render watcher, if it has one.
    fn render_watcher_id(&self) -> Option<u64>;

    /// Invoke any user-registered handler for `hook`.
    fn call_hook(&self, hook: Lifecycle);

    /// Mark the instance active and notify activation, recursing into
    /// children. `direct` is true when invoked from the scheduler's
    /// post-flush pass rather than from a parent's activation.
    fn activate(&self, direct: bool);
}

// ─── Consumer ────────────────────────────────────────────────────────────────

/// Contract for a caller of deferred-unit resolution.
///
/// The resolver holds consumers weakly; a dropped consumer's replay is simply
/// skipped.
pub trait Consumer {
    /// Re-run this consumer's evaluation using currently available resolver
    /// state. Invoked for every pending consumer on resolution, failure, and
    /// the loading-delay transition.
    fn force_update(&self);
}
