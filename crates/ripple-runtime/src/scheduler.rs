#![forbid(unsafe_code)]

//! Update scheduler.
//!
//! Invalidated watchers enqueue themselves here; the scheduler collects them,
//! deduplicates by id, defers a single flush to the next tick, and runs the
//! queue in ascending id order. Ascending id equals creation order, which
//! yields the ordering the rest of the system depends on:
//!
//! - parents recompute before children (parents are constructed first),
//! - user-declared watchers run before a component's render watcher
//!   (declared earlier),
//! - a component destroyed mid-flush by an ancestor's computation can skip
//!   its own queued watcher itself; the scheduler never checks liveness.
//!
//! # State machine
//!
//! **Idle** → **Waiting** (first enqueue schedules a flush) → **Flushing**
//! (tick boundary) → **Idle** (all state reset). In the diagnostic
//! fully-synchronous mode ([`UpdateScheduler::new_sync`]) the flush runs
//! immediately on the scheduling enqueue instead of deferring.
//!
//! # Mid-flush enqueues
//!
//! A watcher enqueued while a flush is executing is placed at its sorted
//! position relative to the not-yet-executed suffix. One whose id is smaller
//! than the cursor's current id has already missed its sorted slot; it is
//! carried over and runs in the next flush. One whose id is greater or equal
//! runs later in the same pass (an equal id is the self-re-enqueue case the
//! circular guard exists for).
//!
//! # Circular updates
//!
//! A per-id counter tracks how many times a watcher is re-queued during one
//! flush cycle. Past [`MAX_UPDATE_COUNT`] the flush abandons the remaining
//! queue with a diagnostic naming the offending watcher; state resets
//! normally on the next tick. Not a crash.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ripple_core::contract::{Component, Lifecycle, Watch};
use ripple_core::diag::{DiagSink, TracingSink};
use ripple_core::ticks::TickRuntime;

/// Re-queues of one watcher tolerated within a single flush cycle before the
/// flush is abandoned as a suspected infinite update loop.
pub const MAX_UPDATE_COUNT: u32 = 100;

struct SchedulerInner {
    /// Pending watchers, sorted ascending by id once a flush begins.
    queue: Vec<Rc<dyn Watch>>,
    /// Presence set: at most one queue entry per id between flush starts.
    has: HashSet<u64>,
    /// Watchers that missed their sorted slot mid-flush; run next flush.
    carryover: Vec<Rc<dyn Watch>>,
    /// Per-id re-queue counter for the current flush cycle.
    circular: HashMap<u64, u32>,
    /// Components queued for the post-flush activated pass.
    activated: Vec<Rc<dyn Component>>,
    /// A flush has been scheduled but not started.
    waiting: bool,
    /// A flush is actively executing.
    flushing: bool,
    /// Execution cursor within the queue during a flush.
    index: usize,
    /// External observation hook for flush completion.
    on_flushed: Option<Rc<dyn Fn()>>,
}

/// The process-wide update queue, as an explicit object.
///
/// Cheaply cloneable; clones share state. Instantiate one per runtime
/// context (tests typically create their own for isolation).
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    ticks: TickRuntime,
    sink: Rc<dyn DiagSink>,
    sync: bool,
}

impl UpdateScheduler {
    /// Scheduler in the normal deferred mode: flushes on the next tick.
    #[must_use]
    pub fn new(ticks: TickRuntime) -> Self {
        Self::build(ticks, false)
    }

    /// Scheduler in the diagnostic fully-synchronous mode: the scheduling
    /// enqueue flushes immediately. Deterministic test harnesses only.
    #[must_use]
    pub fn new_sync(ticks: TickRuntime) -> Self {
        Self::build(ticks, true)
    }

    fn build(ticks: TickRuntime, sync: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                queue: Vec::new(),
                has: HashSet::new(),
                carryover: Vec::new(),
                circular: HashMap::new(),
                activated: Vec::new(),
                waiting: false,
                flushing: false,
                index: 0,
                on_flushed: None,
            })),
            ticks,
            sink: Rc::new(TracingSink),
            sync,
        }
    }

    /// Replace the diagnostics sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Rc<dyn DiagSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a callback invoked after every completed flush, once the
    /// post-flush lifecycle passes have run.
    pub fn on_flushed(&self, callback: impl Fn() + 'static) {
        self.inner.borrow_mut().on_flushed = Some(Rc::new(callback));
    }

    /// Number of watchers currently queued (including carryover).
    #[must_use]
    pub fn pending(&self) -> usize {
        let inner = self.inner.borrow();
        inner.queue.len() + inner.carryover.len()
    }

    /// Whether a flush is actively executing.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.borrow().flushing
    }

    // ── Enqueue ──────────────────────────────────────────────────────

    /// Queue a watcher for the next flush.
    ///
    /// No-op if the watcher's id is already queued in this flush cycle: for
    /// all concurrent invalidations of one watcher between flush boundaries,
    /// exactly one run occurs.
    pub fn enqueue(&self, watcher: Rc<dyn Watch>) {
        let id = watcher.id();
        let schedule = {
            let mut inner = self.inner.borrow_mut();
            if inner.has.contains(&id) {
                return;
            }
            inner.has.insert(id);
            if inner.flushing {
                // Cursor id decides same-flush versus next-flush placement.
                match inner.queue.get(inner.index).map(|w| w.id()) {
                    Some(current) if id < current => inner.carryover.push(watcher),
                    _ => {
                        let mut i = inner.queue.len();
                        while i > inner.index && inner.queue[i - 1].id() > id {
                            i -= 1;
                        }
                        inner.queue.insert(i, watcher);
                    }
                }
            } else {
                inner.queue.push(watcher);
            }
            if inner.waiting {
                false
            } else {
                inner.waiting = true;
                true
            }
        };
        if schedule {
            if self.sync {
                self.flush();
            } else {
                let this = self.clone();
                self.ticks.next_tick(move || this.flush());
            }
        }
    }

    /// Queue a component instance for the post-flush activated pass.
    /// The activated queue is append-only and cleared every flush.
    pub fn queue_activated(&self, component: Rc<dyn Component>) {
        self.inner.borrow_mut().activated.push(component);
    }

    // ── Flush ────────────────────────────────────────────────────────

    /// Run every queued watcher once, in ascending id order, then reset.
    ///
    /// Normally invoked from the scheduled tick; public for harnesses that
    /// drive the scheduler manually.
    pub fn flush(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.flushing = true;
            inner.index = 0;
            inner.queue.sort_by_key(|w| w.id());
        }

        // The queue may grow while iterating; the borrow is released around
        // every watcher callback.
        loop {
            let watcher = {
                let inner = self.inner.borrow();
                match inner.queue.get(inner.index) {
                    Some(w) => Rc::clone(w),
                    None => break,
                }
            };
            watcher.before();
            let id = watcher.id();
            self.inner.borrow_mut().has.remove(&id);
            watcher.run();

            let abort = {
                let mut inner = self.inner.borrow_mut();
                let mut abort = None;
                if inner.has.contains(&id) {
                    // run() re-queued this id within the same flush cycle.
                    let count = inner.circular.entry(id).or_insert(0);
                    *count += 1;
                    if *count > MAX_UPDATE_COUNT {
                        abort = Some(if watcher.is_user() {
                            format!(
                                "possible infinite update loop in watcher with expression \"{}\"",
                                watcher.expression()
                            )
                        } else {
                            format!("possible infinite update loop in a render watcher (id {id})")
                        });
                    }
                }
                inner.index += 1;
                abort
            };
            if let Some(msg) = abort {
                self.sink.warn(&msg);
                break;
            }
        }

        let (activated, flushed, carryover, on_flushed) = {
            let mut inner = self.inner.borrow_mut();
            let activated = std::mem::take(&mut inner.activated);
            let flushed = std::mem::take(&mut inner.queue);
            let carryover = std::mem::take(&mut inner.carryover);
            inner.has.clear();
            inner.circular.clear();
            inner.index = 0;
            inner.flushing = false;
            inner.waiting = false;
            (activated, flushed, carryover, inner.on_flushed.clone())
        };

        for component in &activated {
            component.activate(true);
        }
        // Reverse order: children were created after (and queued after)
        // their parents, so children receive `Updated` first.
        for watcher in flushed.iter().rev() {
            if let Some(owner) = watcher.owner() {
                if owner.is_mounted()
                    && !owner.is_destroyed()
                    && owner.render_watcher_id() == Some(watcher.id())
                {
                    owner.call_hook(Lifecycle::Updated);
                }
            }
        }

        tracing::debug!(target: "ripple", watchers = flushed.len(), "flush complete");
        if let Some(callback) = on_flushed {
            callback();
        }

        for watcher in carryover {
            self.enqueue(watcher);
        }
    }

    /// Clear all scheduler state. Test isolation.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.queue.clear();
        inner.has.clear();
        inner.carryover.clear();
        inner.circular.clear();
        inner.activated.clear();
        inner.waiting = false;
        inner.flushing = false;
        inner.index = 0;
    }
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("UpdateScheduler")
            .field("queued", &inner.queue.len())
            .field("waiting", &inner.waiting)
            .field("flushing", &inner.flushing)
            .field("sync", &self.sync)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
