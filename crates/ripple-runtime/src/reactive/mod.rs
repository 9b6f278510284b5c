#![forbid(unsafe_code)]

//! Change-tracking primitives.
//!
//! - [`Dep`]: the broadcast object owned by each observed container. Invoked
//!   after a mutation to inform all dependent computations of a change.
//! - [`Subscription`]: RAII guard that removes the callback on drop.
//! - [`ObservedVec`]: an ordered, mutable sequence whose mutating operations
//!   are intercepted to notify the container's `Dep` and recursively make
//!   newly inserted elements observable.
//!
//! # Architecture
//!
//! Single-threaded shared ownership via `Rc`/`RefCell`. Subscribers are
//! stored as `Weak` function pointers and pruned lazily during notification.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 3. Every intercepted mutation triggers exactly one notification, after
//!    the underlying effect has run.

pub mod dep;
pub mod observed;

pub use dep::{Dep, Subscription};
pub use observed::{Observe, ObservedVec};
