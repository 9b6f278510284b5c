#![forbid(unsafe_code)]

//! Core contracts and cooperative-scheduling primitives for Ripple.
//!
//! This crate holds everything the runtime crates agree on but none of them
//! own exclusively:
//!
//! - [`ticks`]: the deferred-tick and timer runtime ([`TickRuntime`]) plus a
//!   manually-advanceable [`VirtualClock`] for deterministic execution.
//! - [`contract`]: the collaborator traits the runtime consumes — [`Watch`]
//!   for units of derived computation, [`Component`] for owning instances,
//!   [`Consumer`] for deferred-resolution callers.
//! - [`diag`]: the human-readable diagnostics channel ([`DiagSink`]).
//!
//! All of Ripple runs on a single logical execution context; nothing in this
//! crate is `Send` and nothing needs locking.

pub mod contract;
pub mod diag;
pub mod ticks;

pub use contract::{Component, Consumer, Lifecycle, Watch, next_watch_id};
pub use diag::{DiagSink, MemorySink, TracingSink};
pub use ticks::{TickRuntime, TimerId, VirtualClock};
