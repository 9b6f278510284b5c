#![forbid(unsafe_code)]

//! Deferred-tick and timer runtime.
//!
//! [`TickRuntime`] is the suspension point of the whole system: the update
//! scheduler defers its flush here, and the deferred-unit resolver registers
//! its delay/timeout timers here. Everything runs on one logical execution
//! context; the embedder pumps the runtime explicitly.
//!
//! # Design
//!
//! Two queues:
//!
//! - **Microtasks** ([`TickRuntime::next_tick`]): zero-argument callbacks that
//!   run after the current synchronous execution completes, before any timer.
//!   Exactly-once per registration.
//! - **Timers** ([`TickRuntime::set_timer`]): callbacks that become due once
//!   the clock passes `now + delay`. Fired in deadline order, ties broken by
//!   registration order. There is no cancellation API — a timer whose work has
//!   become irrelevant must no-op internally.
//!
//! Time is a [`VirtualClock`]: it only moves when [`TickRuntime::advance`] is
//! called, which makes every timing-dependent test fully deterministic. All
//! handles cloned from one runtime share the same clock and queues.
//!
//! # Invariants
//!
//! 1. Microtasks run in FIFO order; callbacks queued while draining run in
//!    the same drain.
//! 2. A timer never fires before its deadline.
//! 3. Due timers fire in (deadline, registration) order.
//! 4. Microtasks queued by a timer callback run before the next timer fires.
//! 5. While an [`TickRuntime::advance`] fires timers, the clock reads each
//!    firing timer's deadline, so nested timer registrations are based at
//!    their parent's firing time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use web_time::{Duration, Instant};

// ─── VirtualClock ────────────────────────────────────────────────────────────

/// A manually-advanceable clock.
///
/// All clones share the same time. `now()` is `epoch + advance total`; real
/// wall-clock time never leaks in, so runs are reproducible.
#[derive(Clone, Debug)]
pub struct VirtualClock {
    epoch: Instant,
    offset_us: Rc<Cell<u64>>,
}

impl VirtualClock {
    /// Create a clock starting at `Instant::now()` with zero offset.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Rc::new(Cell::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.set(self.offset_us.get().saturating_add(us));
    }

    /// Current clock time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.epoch + Duration::from_micros(self.offset_us.get())
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Timer bookkeeping ───────────────────────────────────────────────────────

/// Opaque identifier for a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

type TickFn = Box<dyn FnOnce()>;

struct TimerEntry {
    id: u64,
    deadline: Instant,
    callback: TickFn,
}

struct TickInner {
    microtasks: VecDeque<TickFn>,
    timers: Vec<TimerEntry>,
    next_timer: u64,
}

// ─── TickRuntime ─────────────────────────────────────────────────────────────

/// The deferred-tick scheduling primitive.
///
/// Cheaply cloneable; clones share the same queues and clock.
#[derive(Clone)]
pub struct TickRuntime {
    clock: VirtualClock,
    inner: Rc<RefCell<TickInner>>,
}

impl TickRuntime {
    /// Create a runtime with a fresh [`VirtualClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(VirtualClock::new())
    }

    /// Create a runtime sharing an existing clock.
    #[must_use]
    pub fn with_clock(clock: VirtualClock) -> Self {
        Self {
            clock,
            inner: Rc::new(RefCell::new(TickInner {
                microtasks: VecDeque::new(),
                timers: Vec::new(),
                next_timer: 1,
            })),
        }
    }

    /// The clock driving this runtime.
    #[must_use]
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Queue `callback` to run after the current synchronous execution.
    pub fn next_tick(&self, callback: impl FnOnce() + 'static) {
        self.inner
            .borrow_mut()
            .microtasks
            .push_back(Box::new(callback));
    }

    /// Register `callback` to fire once the clock passes `now + delay`.
    pub fn set_timer(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_timer;
        inner.next_timer += 1;
        inner.timers.push(TimerEntry {
            id,
            deadline: self.clock.now() + delay,
            callback: Box::new(callback),
        });
        TimerId(id)
    }

    /// Drain the microtask queue, including callbacks queued while draining.
    pub fn run_ticks(&self) {
        loop {
            // Borrow is released before the callback runs so callbacks may
            // queue further microtasks or timers.
            let next = self.inner.borrow_mut().microtasks.pop_front();
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Advance the clock by `delta` and fire everything that becomes due.
    ///
    /// Pending microtasks are drained first (advancing time implies the
    /// current synchronous execution has finished). Then the clock steps
    /// from deadline to deadline: each due timer fires with the clock set to
    /// its own deadline, so a timer registered from inside a timer callback
    /// is measured from the moment its parent fired, not from the end of the
    /// advance. Microtasks drain after each timer; the clock lands exactly
    /// on `now + delta` once nothing is due any more.
    pub fn advance(&self, delta: Duration) {
        self.run_ticks();
        let target = self.clock.now() + delta;
        while let Some(timer) = self.pop_due_timer(target) {
            let now = self.clock.now();
            if timer.deadline > now {
                self.clock.advance(timer.deadline.duration_since(now));
            }
            (timer.callback)();
            self.run_ticks();
        }
        let now = self.clock.now();
        if target > now {
            self.clock.advance(target.duration_since(now));
        }
    }

    fn pop_due_timer(&self, target: Instant) -> Option<TimerEntry> {
        let mut inner = self.inner.borrow_mut();
        let pos = inner
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= target)
            .min_by_key(|(_, t)| (t.deadline, t.id))
            .map(|(i, _)| i)?;
        Some(inner.timers.remove(pos))
    }

    /// Number of queued microtasks.
    #[must_use]
    pub fn pending_ticks(&self) -> usize {
        self.inner.borrow().microtasks.len()
    }

    /// Number of registered, not-yet-fired timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }
}

impl Default for TickRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TickRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TickRuntime")
            .field("microtasks", &inner.microtasks.len())
            .field("timers", &inner.timers.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
