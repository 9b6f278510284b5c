#![forbid(unsafe_code)]

//! Ripple public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use ripple_core as core;
    pub use ripple_runtime as runtime;

    pub use ripple_core::contract::{Component, Consumer, Lifecycle, Watch};
    pub use ripple_core::ticks::{TickRuntime, VirtualClock};
    pub use ripple_runtime::deferred::{
        DeferredFactory, Eventual, ProducerOutput, ResourceDescriptor, resolve,
    };
    pub use ripple_runtime::reactive::{Dep, Observe, ObservedVec, Subscription};
    pub use ripple_runtime::scheduler::UpdateScheduler;
}
