//! End-to-end change propagation.
//!
//! Wires the three subsystems together the way an integrating framework
//! would: observed sequence mutations notify a `Dep`, the subscribed view
//! enqueues its watcher into the `UpdateScheduler`, the flush recomputes on
//! the next tick, and views referencing a deferred unit render a placeholder
//! until the producer settles and forces a re-evaluation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ripple_core::contract::{Consumer, Watch, next_watch_id};
use ripple_core::ticks::TickRuntime;
use ripple_runtime::deferred::{
    DeferredFactory, Eventual, ProducerOutput, ResourceDescriptor, resolve,
};
use ripple_runtime::reactive::{ObservedVec, Subscription};
use ripple_runtime::scheduler::UpdateScheduler;
use web_time::Duration;

// ── List view ────────────────────────────────────────────────────────

/// A view over an observed list: re-renders a snapshot on every flush.
struct ListView {
    watcher_id: u64,
    items: Rc<RefCell<ObservedVec<String>>>,
    renders: Rc<RefCell<Vec<Vec<String>>>>,
    order: Rc<RefCell<Vec<u64>>>,
}

impl ListView {
    fn mount(
        sched: &UpdateScheduler,
        items: Rc<RefCell<ObservedVec<String>>>,
        order: &Rc<RefCell<Vec<u64>>>,
    ) -> (Rc<Self>, Subscription) {
        let view = Rc::new(Self {
            watcher_id: next_watch_id(),
            items: Rc::clone(&items),
            renders: Rc::new(RefCell::new(Vec::new())),
            order: Rc::clone(order),
        });
        let sub = {
            let sched = sched.clone();
            let view = Rc::clone(&view);
            items
                .borrow()
                .dep()
                .subscribe(move || sched.enqueue(view.clone()))
        };
        (view, sub)
    }
}

impl Watch for ListView {
    fn id(&self) -> u64 {
        self.watcher_id
    }
    fn run(&self) {
        let snapshot = self.items.borrow().iter().cloned().collect();
        self.renders.borrow_mut().push(snapshot);
        self.order.borrow_mut().push(self.watcher_id);
    }
}

#[test]
fn burst_of_mutations_renders_once_per_tick() {
    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let items = Rc::new(RefCell::new(ObservedVec::from_vec(vec!["a".to_string()])));
    let order = Rc::new(RefCell::new(Vec::new()));
    let (view, _sub) = ListView::mount(&sched, Rc::clone(&items), &order);

    items.borrow_mut().push("b".to_string());
    items.borrow_mut().unshift("z".to_string());
    items.borrow_mut().splice(1, 1, vec!["A".to_string()]);
    assert!(view.renders.borrow().is_empty());

    ticks.run_ticks();
    let renders = view.renders.borrow();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0], vec!["z", "A", "b"]);
}

#[test]
fn views_recompute_in_creation_order() {
    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let items = Rc::new(RefCell::new(ObservedVec::from_vec(vec!["x".to_string()])));
    let order = Rc::new(RefCell::new(Vec::new()));
    // Parent mounted before child: lower watcher id. The subscriber list
    // notifies in registration order, but even if the child's callback ran
    // first, the flush sorts by id.
    let (parent, _ps) = ListView::mount(&sched, Rc::clone(&items), &order);
    let (child, _cs) = ListView::mount(&sched, Rc::clone(&items), &order);
    assert!(parent.watcher_id < child.watcher_id);

    // Enqueue the child ahead of the mutation; the flush restores id order.
    sched.enqueue(child.clone());
    items.borrow_mut().push("y".to_string());
    ticks.run_ticks();
    assert_eq!(*order.borrow(), vec![parent.watcher_id, child.watcher_id]);
    assert_eq!(parent.renders.borrow().len(), 1);
    assert_eq!(child.renders.borrow().len(), 1);
}

// ── Deferred view ────────────────────────────────────────────────────

/// A view over a deferred unit. Each render resolves the factory; a `None`
/// render is the placeholder state. Settlement forces a re-render through
/// the scheduler, not directly.
struct DeferredView {
    watcher_id: u64,
    factory: Rc<DeferredFactory<&'static str>>,
    sched: UpdateScheduler,
    ticks: TickRuntime,
    renders: Rc<RefCell<Vec<Option<&'static str>>>>,
    this: RefCell<Weak<DeferredView>>,
}

impl DeferredView {
    fn mount(
        sched: &UpdateScheduler,
        ticks: &TickRuntime,
        factory: Rc<DeferredFactory<&'static str>>,
    ) -> Rc<Self> {
        let view = Rc::new(Self {
            watcher_id: next_watch_id(),
            factory,
            sched: sched.clone(),
            ticks: ticks.clone(),
            renders: Rc::new(RefCell::new(Vec::new())),
            this: RefCell::new(Weak::new()),
        });
        *view.this.borrow_mut() = Rc::downgrade(&view);
        view
    }

    fn render_now(self: &Rc<Self>) {
        self.sched.enqueue(self.clone());
        self.ticks.run_ticks();
    }
}

impl Watch for DeferredView {
    fn id(&self) -> u64 {
        self.watcher_id
    }
    fn run(&self) {
        let consumer: Rc<dyn Consumer> = match self.this.borrow().upgrade() {
            Some(view) => view,
            None => return,
        };
        let got = resolve(&self.factory, &consumer, &self.ticks);
        self.renders.borrow_mut().push(got);
    }
}

impl Consumer for DeferredView {
    fn force_update(&self) {
        if let Some(view) = self.this.borrow().upgrade() {
            self.sched.enqueue(view);
        }
    }
}

#[test]
fn deferred_unit_placeholder_then_real_render() {
    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let (unit, handle) = Eventual::new();
    let factory = DeferredFactory::new(move |_| ProducerOutput::Eventual(unit));
    let view = DeferredView::mount(&sched, &ticks, factory);

    view.render_now();
    assert_eq!(*view.renders.borrow(), vec![None]);

    // Settlement forces a re-evaluation, which goes through the scheduler
    // and lands on the next tick.
    handle.ok("article");
    assert_eq!(view.renders.borrow().len(), 1);
    ticks.run_ticks();
    assert_eq!(*view.renders.borrow(), vec![None, Some("article")]);
}

#[test]
fn deferred_unit_loading_substitute_between_delay_and_settlement() {
    let ticks = TickRuntime::new();
    let sched = UpdateScheduler::new(ticks.clone());
    let (unit, handle) = Eventual::new();
    let factory = DeferredFactory::new(move |_| {
        let mut descriptor = ResourceDescriptor::new(unit);
        descriptor.loading = Some("spinner");
        descriptor.delay = Some(Duration::from_millis(50));
        ProducerOutput::Descriptor(descriptor)
    });
    let view = DeferredView::mount(&sched, &ticks, factory);

    view.render_now();
    assert_eq!(*view.renders.borrow(), vec![None]);

    // Delay elapses unresolved: the loading substitute is forced in.
    ticks.advance(Duration::from_millis(50));
    assert_eq!(*view.renders.borrow(), vec![None, Some("spinner")]);

    handle.ok("article");
    ticks.run_ticks();
    assert_eq!(
        *view.renders.borrow(),
        vec![None, Some("spinner"), Some("article")]
    );
}
