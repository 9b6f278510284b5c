//! Property-based invariant tests for the update scheduler.
//!
//! Verifies structural guarantees of `UpdateScheduler`:
//!
//! 1. A flush runs every queued watcher exactly once, in ascending id order
//! 2. Duplicate enqueues of one id between flushes collapse to a single run
//! 3. Determinism: the same enqueue sequence produces the same run order
//! 4. All scheduler state is reset after a flush completes
//! 5. One scheduled tick per flush cycle regardless of enqueue count
//! 6. A self-re-queueing watcher never runs more than the loop threshold
//!    allows, and the scheduler recovers on the next cycle

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use ripple_core::contract::Watch;
use ripple_core::ticks::TickRuntime;
use ripple_runtime::scheduler::{MAX_UPDATE_COUNT, UpdateScheduler};

// ── Helpers ──────────────────────────────────────────────────────────

struct RecordingWatcher {
    id: u64,
    runs: Rc<RefCell<Vec<u64>>>,
}

impl Watch for RecordingWatcher {
    fn id(&self) -> u64 {
        self.id
    }
    fn run(&self) {
        self.runs.borrow_mut().push(self.id);
    }
}

fn run_sequence(ids: &[u64]) -> Vec<u64> {
    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let runs = Rc::new(RefCell::new(Vec::new()));
    for &id in ids {
        sched.enqueue(Rc::new(RecordingWatcher {
            id,
            runs: Rc::clone(&runs),
        }));
    }
    ticks.run_ticks();
    let out = runs.borrow().clone();
    out
}

fn arb_ids() -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(0u64..32, 0..=64)
}

// ═════════════════════════════════════════════════════════════════════════
// 1 + 2. Sorted, distinct execution
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn flush_is_sorted_and_distinct(ids in arb_ids()) {
        let runs = run_sequence(&ids);
        let expected: Vec<u64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(runs, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Determinism
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn deterministic(ids in arb_ids()) {
        prop_assert_eq!(run_sequence(&ids), run_sequence(&ids));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. State reset: a second cycle is independent of the first
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn cycles_are_independent(first in arb_ids(), second in arb_ids()) {
        let ticks = TickRuntime::new();
        let sched = UpdateScheduler::new(ticks.clone());
        let runs = Rc::new(RefCell::new(Vec::new()));
        for &id in &first {
            sched.enqueue(Rc::new(RecordingWatcher { id, runs: Rc::clone(&runs) }));
        }
        ticks.run_ticks();
        prop_assert_eq!(sched.pending(), 0);
        runs.borrow_mut().clear();
        for &id in &second {
            sched.enqueue(Rc::new(RecordingWatcher { id, runs: Rc::clone(&runs) }));
        }
        ticks.run_ticks();
        let got = runs.borrow().clone();
        prop_assert_eq!(got, run_sequence(&second));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Single scheduled flush per cycle
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn one_tick_per_cycle(ids in arb_ids()) {
        let ticks = TickRuntime::new();
        let sched = UpdateScheduler::new(ticks.clone());
        let runs = Rc::new(RefCell::new(Vec::new()));
        for &id in &ids {
            sched.enqueue(Rc::new(RecordingWatcher { id, runs: Rc::clone(&runs) }));
        }
        prop_assert!(ticks.pending_ticks() <= 1);
        prop_assert_eq!(ticks.pending_ticks() == 1, !ids.is_empty());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Loop guard bounds re-runs and the scheduler recovers
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn loop_guard_bounds_reruns_and_recovers() {
    struct LoopingWatcher {
        sched: UpdateScheduler,
        count: Rc<RefCell<u32>>,
        this: RefCell<Option<Rc<LoopingWatcher>>>,
    }
    impl Watch for LoopingWatcher {
        fn id(&self) -> u64 {
            1
        }
        fn run(&self) {
            *self.count.borrow_mut() += 1;
            let this = self.this.borrow().clone();
            if let Some(this) = this {
                self.sched.enqueue(this);
            }
        }
    }

    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let count = Rc::new(RefCell::new(0u32));
    let looping = Rc::new(LoopingWatcher {
        sched: sched.clone(),
        count: Rc::clone(&count),
        this: RefCell::new(None),
    });
    *looping.this.borrow_mut() = Some(Rc::clone(&looping));
    sched.enqueue(looping.clone());
    ticks.run_ticks();
    assert_eq!(*count.borrow(), MAX_UPDATE_COUNT + 1);

    // Break the cycle and verify the next flush is clean.
    *looping.this.borrow_mut() = None;
    *count.borrow_mut() = 0;
    sched.enqueue(looping);
    ticks.run_ticks();
    assert_eq!(*count.borrow(), 1);
}
