#![forbid(unsafe_code)]

//! Deferred-unit resolution.
//!
//! A [`DeferredFactory`] wraps a producer of a computation unit and manages
//! its one-time resolution: the producer is invoked at most once per factory,
//! the result is cached, and completion is replayed to every consumer that
//! asked before resolution via a forced re-evaluation request.
//!
//! # State machine
//!
//! **Unrequested → Pending → {Resolved | Errored}**, with an orthogonal
//! Loading flag reachable only from Pending. `Resolved` and `Errored` are
//! write-once: a single settle guard makes the second and every later
//! completion or failure a no-op.
//!
//! # Producer outputs
//!
//! The producer receives a [`SettleHandle`] (idempotent `complete`/`fail`)
//! and returns a [`ProducerOutput`], a tagged union decided once at the
//! invocation boundary:
//!
//! - [`Unit`](ProducerOutput::Unit): a direct synchronous unit.
//! - [`Eventual`](ProducerOutput::Eventual): an eventual result, chained to
//!   the settle handle unless something was already recorded synchronously.
//! - [`Descriptor`](ProducerOutput::Descriptor): an eventual result plus
//!   optional error/loading substitutes, a loading delay, and a timeout.
//! - [`Opaque`](ProducerOutput::Opaque): nothing recognizable. Resolution
//!   stays pending until (unless) the producer uses the settle handle.
//!
//! # Synchronous vs. asynchronous completion
//!
//! Completion that happens while the producer call is still on the stack only
//! clears the pending-consumer list — the initial caller's own evaluation
//! picks up the result. Completion after the producer has returned forces a
//! re-evaluation of every pending consumer, then clears the list.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ripple_core::contract::Consumer;
use ripple_core::diag::{DiagSink, TracingSink};
use ripple_core::ticks::TickRuntime;
use web_time::Duration;

/// Loading delay applied when a descriptor has a loading substitute but no
/// explicit `delay`.
pub const DEFAULT_LOADING_DELAY: Duration = Duration::from_millis(200);

// ─── Eventual ────────────────────────────────────────────────────────────────

enum EventualState<U> {
    Pending {
        on_ok: Vec<Box<dyn FnOnce(U)>>,
        on_err: Vec<Box<dyn FnOnce(String)>>,
    },
    Ok(U),
    Err(String),
}

/// A single-threaded eventual result: a value cell that settles exactly once.
///
/// Callbacks registered before settlement run at settlement, in registration
/// order; callbacks registered after settlement run immediately.
pub struct Eventual<U> {
    inner: Rc<RefCell<EventualState<U>>>,
}

impl<U> Clone for Eventual<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Settling side of an [`Eventual`].
pub struct EventualHandle<U> {
    inner: Rc<RefCell<EventualState<U>>>,
}

impl<U: Clone + 'static> Eventual<U> {
    /// Create an unsettled eventual plus its settling handle.
    #[must_use]
    pub fn new() -> (Self, EventualHandle<U>) {
        let inner = Rc::new(RefCell::new(EventualState::Pending {
            on_ok: Vec::new(),
            on_err: Vec::new(),
        }));
        (
            Self {
                inner: Rc::clone(&inner),
            },
            EventualHandle { inner },
        )
    }

    /// An eventual that is already successful.
    #[must_use]
    pub fn ok(value: U) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventualState::Ok(value))),
        }
    }

    /// An eventual that has already failed.
    #[must_use]
    pub fn err(reason: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventualState::Err(reason.into()))),
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(&*self.inner.borrow(), EventualState::Pending { .. })
    }

    /// Chain settlement callbacks.
    pub fn then(&self, on_ok: impl FnOnce(U) + 'static, on_err: impl FnOnce(String) + 'static) {
        enum Ready<U> {
            NotYet,
            Value(U),
            Reason(String),
        }
        let ready = match &*self.inner.borrow() {
            EventualState::Pending { .. } => Ready::NotYet,
            EventualState::Ok(value) => Ready::Value(value.clone()),
            EventualState::Err(reason) => Ready::Reason(reason.clone()),
        };
        match ready {
            Ready::NotYet => {
                let mut state = self.inner.borrow_mut();
                if let EventualState::Pending {
                    on_ok: oks,
                    on_err: errs,
                } = &mut *state
                {
                    oks.push(Box::new(on_ok));
                    errs.push(Box::new(on_err));
                }
            }
            Ready::Value(value) => on_ok(value),
            Ready::Reason(reason) => on_err(reason),
        }
    }
}

impl<U: Clone> EventualHandle<U> {
    /// Settle successfully. No-op if already settled.
    pub fn ok(&self, value: U) {
        let callbacks = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                EventualState::Pending { on_ok, .. } => {
                    let callbacks = std::mem::take(on_ok);
                    *state = EventualState::Ok(value.clone());
                    callbacks
                }
                _ => return,
            }
        };
        for callback in callbacks {
            callback(value.clone());
        }
    }

    /// Settle with a failure reason. No-op if already settled.
    pub fn err(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let callbacks = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                EventualState::Pending { on_err, .. } => {
                    let callbacks = std::mem::take(on_err);
                    *state = EventualState::Err(reason.clone());
                    callbacks
                }
                _ => return,
            }
        };
        for callback in callbacks {
            callback(reason.clone());
        }
    }
}

// ─── Producer output ─────────────────────────────────────────────────────────

/// A resource descriptor: an eventual unit plus presentation substitutes.
pub struct ResourceDescriptor<U> {
    /// The eventual computation unit.
    pub unit: Eventual<U>,
    /// Interim unit shown while resolution is pending past the delay.
    pub loading: Option<U>,
    /// Substitute unit shown once resolution fails.
    pub error: Option<U>,
    /// Delay before the loading substitute appears. `Some(ZERO)` shows it on
    /// the very first resolve; `None` means [`DEFAULT_LOADING_DELAY`].
    pub delay: Option<Duration>,
    /// Deadline after which an unresolved unit is failed.
    pub timeout: Option<Duration>,
}

impl<U> ResourceDescriptor<U> {
    /// Descriptor with only the eventual unit; substitutes unset.
    #[must_use]
    pub fn new(unit: Eventual<U>) -> Self {
        Self {
            unit,
            loading: None,
            error: None,
            delay: None,
            timeout: None,
        }
    }
}

/// What a producer returned, decided once at the invocation boundary.
pub enum ProducerOutput<U> {
    /// A direct synchronous unit.
    Unit(U),
    /// An eventual result.
    Eventual(Eventual<U>),
    /// A resource descriptor.
    Descriptor(ResourceDescriptor<U>),
    /// Nothing recognizable; the producer may settle via the handle later,
    /// or never.
    Opaque,
}

type ProducerFn<U> = Box<dyn FnOnce(SettleHandle<U>) -> ProducerOutput<U>>;

// ─── DeferredFactory ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unrequested,
    Pending,
    Resolved,
    Errored,
}

struct FactoryState<U> {
    phase: Phase,
    resolved: Option<U>,
    error_unit: Option<U>,
    loading_unit: Option<U>,
    loading: bool,
    /// Consumers that requested resolution before completion. Weak: a dead
    /// consumer's replay is skipped, not tracked.
    consumers: Vec<Weak<dyn Consumer>>,
    /// Settle guard: covers both completion and failure.
    settled: bool,
    /// True while the producer call is on the stack.
    invoking: bool,
}

/// Shared per-producer descriptor: one factory, any number of consumers.
pub struct DeferredFactory<U> {
    producer: RefCell<Option<ProducerFn<U>>>,
    state: RefCell<FactoryState<U>>,
    sink: Rc<dyn DiagSink>,
}

impl<U: Clone + 'static> DeferredFactory<U> {
    /// Wrap a producer. The producer runs on the first [`resolve`] call.
    #[must_use]
    pub fn new(producer: impl FnOnce(SettleHandle<U>) -> ProducerOutput<U> + 'static) -> Rc<Self> {
        Self::with_sink(producer, Rc::new(TracingSink))
    }

    /// Wrap a producer with an explicit diagnostics sink.
    #[must_use]
    pub fn with_sink(
        producer: impl FnOnce(SettleHandle<U>) -> ProducerOutput<U> + 'static,
        sink: Rc<dyn DiagSink>,
    ) -> Rc<Self> {
        Rc::new(Self {
            producer: RefCell::new(Some(Box::new(producer))),
            state: RefCell::new(FactoryState {
                phase: Phase::Unrequested,
                resolved: None,
                error_unit: None,
                loading_unit: None,
                loading: false,
                consumers: Vec::new(),
                settled: false,
                invoking: false,
            }),
            sink,
        })
    }

    /// The final unit, once successfully produced.
    #[must_use]
    pub fn resolved(&self) -> Option<U> {
        self.state.borrow().resolved.clone()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.borrow().phase == Phase::Resolved
    }

    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.state.borrow().phase == Phase::Errored
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Number of live consumers awaiting resolution.
    #[must_use]
    pub fn pending_consumers(&self) -> usize {
        self.state
            .borrow()
            .consumers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn complete(&self, unit: U) {
        let (replay, consumers) = {
            let mut state = self.state.borrow_mut();
            if state.settled {
                return;
            }
            state.settled = true;
            state.phase = Phase::Resolved;
            state.resolved = Some(unit);
            // Synchronous completion: the initial caller's own evaluation
            // picks up the result, so no forced re-evaluation.
            (!state.invoking, std::mem::take(&mut state.consumers))
        };
        if replay {
            replay_consumers(&consumers);
        }
    }

    fn fail(&self, reason: &str) {
        let (replay, consumers) = {
            let mut state = self.state.borrow_mut();
            if state.settled {
                return;
            }
            state.settled = true;
            state.phase = Phase::Errored;
            (state.error_unit.is_some(), std::mem::take(&mut state.consumers))
        };
        self.sink
            .warn(&format!("failed to resolve deferred unit: {reason}"));
        if replay {
            replay_consumers(&consumers);
        }
    }
}

fn replay_consumers(consumers: &[Weak<dyn Consumer>]) {
    for consumer in consumers {
        if let Some(consumer) = consumer.upgrade() {
            consumer.force_update();
        }
    }
}

// ─── SettleHandle ────────────────────────────────────────────────────────────

/// Completion handle given to the producer. Cloneable so the producer can
/// stash it for later asynchronous settlement. Holds the factory weakly: a
/// dropped factory makes settlement a no-op.
pub struct SettleHandle<U> {
    factory: Weak<DeferredFactory<U>>,
}

impl<U> Clone for SettleHandle<U> {
    fn clone(&self) -> Self {
        Self {
            factory: Weak::clone(&self.factory),
        }
    }
}

impl<U: Clone + 'static> SettleHandle<U> {
    /// Record the produced unit. Only the first settlement has effect.
    pub fn complete(&self, unit: U) {
        if let Some(factory) = self.factory.upgrade() {
            factory.complete(unit);
        }
    }

    /// Record a failure. Only the first settlement has effect.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(factory) = self.factory.upgrade() {
            factory.fail(&reason.into());
        }
    }
}

// ─── resolve ─────────────────────────────────────────────────────────────────

/// Resolve a deferred unit on behalf of `consumer`.
///
/// Returns the unit (or an error/loading substitute) when one is available
/// now, or `None` when the caller should render a placeholder and wait for a
/// forced re-evaluation.
///
/// The producer is invoked at most once per factory across all consumers;
/// later callers are registered as pending consumers and replayed on
/// settlement.
pub fn resolve<U: Clone + 'static>(
    factory: &Rc<DeferredFactory<U>>,
    consumer: &Rc<dyn Consumer>,
    ticks: &TickRuntime,
) -> Option<U> {
    {
        let mut state = factory.state.borrow_mut();
        match state.phase {
            // With no error substitute an errored unit renders as nothing.
            Phase::Errored => return state.error_unit.clone(),
            Phase::Resolved => return state.resolved.clone(),
            Phase::Pending => {
                if state.loading && state.loading_unit.is_some() {
                    return state.loading_unit.clone();
                }
                let weak = Rc::downgrade(consumer);
                if !state.consumers.iter().any(|w| Weak::ptr_eq(w, &weak)) {
                    state.consumers.push(weak);
                }
                return None;
            }
            Phase::Unrequested => {
                state.phase = Phase::Pending;
                state.consumers.push(Rc::downgrade(consumer));
                state.invoking = true;
            }
        }
    }

    let producer = factory.producer.borrow_mut().take();
    let handle = SettleHandle {
        factory: Rc::downgrade(factory),
    };
    let output = match producer {
        Some(produce) => produce(handle.clone()),
        // Unreachable via the phase machine; kept total.
        None => ProducerOutput::Opaque,
    };

    match output {
        ProducerOutput::Unit(unit) => factory.complete(unit),
        ProducerOutput::Eventual(eventual) => {
            // Only chain if nothing was recorded synchronously.
            if !factory.state.borrow().settled {
                let ok = handle.clone();
                let err = handle;
                eventual.then(move |unit| ok.complete(unit), move |reason| err.fail(reason));
            }
        }
        ProducerOutput::Descriptor(descriptor) => {
            wire_descriptor(factory, &handle, descriptor, ticks);
        }
        ProducerOutput::Opaque => {
            tracing::trace!(
                target: "ripple",
                "deferred producer returned no recognizable result; \
                 resolution stays pending until the settle handle is used"
            );
        }
    }

    let mut state = factory.state.borrow_mut();
    state.invoking = false;
    if state.loading {
        state.loading_unit.clone()
    } else {
        state.resolved.clone()
    }
}

fn wire_descriptor<U: Clone + 'static>(
    factory: &Rc<DeferredFactory<U>>,
    handle: &SettleHandle<U>,
    descriptor: ResourceDescriptor<U>,
    ticks: &TickRuntime,
) {
    let ResourceDescriptor {
        unit,
        loading,
        error,
        delay,
        timeout,
    } = descriptor;

    // The error substitute is recorded before failure can observe it.
    if let Some(error_unit) = error {
        factory.state.borrow_mut().error_unit = Some(error_unit);
    }

    {
        let ok = handle.clone();
        let err = handle.clone();
        unit.then(move |unit| ok.complete(unit), move |reason| err.fail(reason));
    }

    if let Some(loading_unit) = loading {
        let show_now = {
            let mut state = factory.state.borrow_mut();
            state.loading_unit = Some(loading_unit);
            delay == Some(Duration::ZERO) && !state.settled
        };
        if show_now {
            factory.state.borrow_mut().loading = true;
        } else if delay != Some(Duration::ZERO) {
            let delay = delay.unwrap_or(DEFAULT_LOADING_DELAY);
            let weak = Rc::downgrade(factory);
            ticks.set_timer(delay, move || {
                let Some(factory) = weak.upgrade() else { return };
                let replay = {
                    let mut state = factory.state.borrow_mut();
                    if state.resolved.is_none() && state.phase != Phase::Errored {
                        state.loading = true;
                        // Replay without clearing: these consumers still
                        // await the real unit.
                        state.consumers.clone()
                    } else {
                        Vec::new()
                    }
                };
                replay_consumers(&replay);
            });
        }
    }

    if let Some(timeout) = timeout {
        let weak = Rc::downgrade(factory);
        ticks.set_timer(timeout, move || {
            let Some(factory) = weak.upgrade() else { return };
            let unresolved = factory.state.borrow().resolved.is_none();
            if unresolved {
                factory.fail(&format!("timeout ({}ms)", timeout.as_millis()));
            }
        });
    }
}

// ─── Placeholder ─────────────────────────────────────────────────────────────

/// Inert placeholder node for a not-yet-resolved unit.
///
/// Carries a back-reference to the factory and the original invocation
/// context so the placeholder can be swapped for the real unit during the
/// next render pass.
pub struct Placeholder<U, D, C> {
    factory: Rc<DeferredFactory<U>>,
    data: D,
    children: Vec<C>,
    tag: Option<String>,
    consumer: Weak<dyn Consumer>,
}

/// Construct a placeholder for `factory` as requested by `consumer`.
pub fn make_placeholder<U, D, C>(
    factory: &Rc<DeferredFactory<U>>,
    data: D,
    consumer: &Rc<dyn Consumer>,
    children: Vec<C>,
    tag: Option<String>,
) -> Placeholder<U, D, C> {
    Placeholder {
        factory: Rc::clone(factory),
        data,
        children,
        tag,
        consumer: Rc::downgrade(consumer),
    }
}

impl<U: Clone + 'static, D, C> Placeholder<U, D, C> {
    #[must_use]
    pub fn factory(&self) -> &Rc<DeferredFactory<U>> {
        &self.factory
    }

    #[must_use]
    pub fn data(&self) -> &D {
        &self.data
    }

    #[must_use]
    pub fn children(&self) -> &[C] {
        &self.children
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The requesting consumer, if still alive.
    #[must_use]
    pub fn consumer(&self) -> Option<Rc<dyn Consumer>> {
        self.consumer.upgrade()
    }

    /// The real unit, once resolution has completed.
    #[must_use]
    pub fn swap(&self) -> Option<U> {
        self.factory.resolved()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
