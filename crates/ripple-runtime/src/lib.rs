#![forbid(unsafe_code)]

//! The Ripple change-propagation runtime.
//!
//! Three tightly coupled subsystems, all concerned with *when* and *in what
//! order* derived work re-runs after mutable state changes:
//!
//! - [`reactive`]: mutation interception. [`ObservedVec`] wraps an ordered
//!   sequence so every mutating operation notifies the container's [`Dep`]
//!   and makes newly inserted elements observable.
//! - [`scheduler`]: the update scheduler. Invalidated watchers enqueue into
//!   an [`UpdateScheduler`], which deduplicates by id, defers a single flush
//!   to the next tick, and runs the queue in ascending id order with
//!   infinite-loop detection.
//! - [`deferred`]: deferred-unit resolution. A [`DeferredFactory`] resolves a
//!   producer exactly once, caches the result, and replays completion to
//!   every consumer that asked before resolution.
//!
//! Control flow: a mutation → `Dep::notify()` → each subscribed watcher
//! enqueues itself → the scheduler flushes once on the next tick, in
//! dependency order → watchers referencing an unresolved deferred unit get a
//! placeholder now and a forced re-evaluation when the producer settles.

pub mod deferred;
pub mod reactive;
pub mod scheduler;

pub use deferred::{
    DEFAULT_LOADING_DELAY, DeferredFactory, Eventual, EventualHandle, Placeholder, ProducerOutput,
    ResourceDescriptor, SettleHandle, make_placeholder, resolve,
};
pub use reactive::{Dep, Observe, ObservedVec, Subscription};
pub use scheduler::{MAX_UPDATE_COUNT, UpdateScheduler};
