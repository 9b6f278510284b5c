#![forbid(unsafe_code)]

//! Observed ordered sequence.
//!
//! [`ObservedVec`] is an explicit wrapper composed around `Vec<T>`: callers
//! must go through it to get notification semantics. Each intercepted
//! operation invokes the native effect first, captures its return value
//! unchanged, recursively makes newly inserted elements observable, then
//! triggers the container's [`Dep`] exactly once.
//!
//! Which arguments count as newly inserted:
//!
//! - [`push`](ObservedVec::push) / [`extend`](ObservedVec::extend) /
//!   [`unshift`](ObservedVec::unshift): all of them.
//! - [`splice`](ObservedVec::splice): the inserted elements (not the removal
//!   count).
//! - [`pop`](ObservedVec::pop) / [`shift`](ObservedVec::shift) /
//!   [`sort_by`](ObservedVec::sort_by) / [`reverse`](ObservedVec::reverse):
//!   none.
//!
//! No error conditions exist beyond those the native operation itself has;
//! out-of-range splice arguments are clamped.

use std::cmp::Ordering;
use std::ops::Range;

use super::dep::Dep;

// ─── Observe ─────────────────────────────────────────────────────────────────

/// Recursively mark a value observable so nested mutations are tracked.
///
/// Idempotent and safe on values with nothing to observe (the default is a
/// no-op). Element types carrying nested observable state override this.
pub trait Observe {
    fn make_observable(&mut self) {}
}

macro_rules! impl_observe_noop {
    ($($ty:ty),* $(,)?) => {
        $(impl Observe for $ty {})*
    };
}

impl_observe_noop!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
);

impl<T: Observe> Observe for Option<T> {
    fn make_observable(&mut self) {
        if let Some(value) = self {
            value.make_observable();
        }
    }
}

// ─── ObservedVec ─────────────────────────────────────────────────────────────

/// An ordered, mutable sequence whose mutations notify a [`Dep`].
#[derive(Debug)]
pub struct ObservedVec<T: Observe> {
    items: Vec<T>,
    dep: Dep,
}

impl<T: Observe> ObservedVec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            dep: Dep::new(),
        }
    }

    /// Wrap an existing vector. Elements are made observable; no
    /// notification fires (nothing has mutated yet).
    #[must_use]
    pub fn from_vec(mut items: Vec<T>) -> Self {
        for item in &mut items {
            item.make_observable();
        }
        Self {
            items,
            dep: Dep::new(),
        }
    }

    /// The container's notifier, for subscription.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    // ── Reads ────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    // ── Intercepted mutations ────────────────────────────────────────

    /// Insert at the end.
    pub fn push(&mut self, value: T) {
        self.items.push(value);
        let start = self.items.len() - 1;
        self.observe_range(start..self.items.len());
        self.dep.notify();
    }

    /// Insert several elements at the end.
    pub fn extend(&mut self, values: impl IntoIterator<Item = T>) {
        let start = self.items.len();
        self.items.extend(values);
        self.observe_range(start..self.items.len());
        self.dep.notify();
    }

    /// Remove from the end.
    pub fn pop(&mut self) -> Option<T> {
        let removed = self.items.pop();
        self.dep.notify();
        removed
    }

    /// Remove from the front.
    pub fn shift(&mut self) -> Option<T> {
        let removed = if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        };
        self.dep.notify();
        removed
    }

    /// Insert at the front.
    pub fn unshift(&mut self, value: T) {
        self.items.insert(0, value);
        self.observe_range(0..1);
        self.dep.notify();
    }

    /// Remove `remove_count` elements starting at `index` and insert
    /// `inserted` in their place, returning the removed elements.
    ///
    /// `index` and `remove_count` are clamped to the valid range.
    pub fn splice(&mut self, index: usize, remove_count: usize, inserted: Vec<T>) -> Vec<T> {
        let start = index.min(self.items.len());
        let end = start.saturating_add(remove_count).min(self.items.len());
        let insert_len = inserted.len();
        let removed: Vec<T> = self.items.splice(start..end, inserted).collect();
        self.observe_range(start..start + insert_len);
        self.dep.notify();
        removed
    }

    /// Reorder by comparator.
    pub fn sort_by(&mut self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.items.sort_by(compare);
        self.dep.notify();
    }

    /// Reverse in place.
    pub fn reverse(&mut self) {
        self.items.reverse();
        self.dep.notify();
    }

    fn observe_range(&mut self, range: Range<usize>) {
        for item in &mut self.items[range] {
            item.make_observable();
        }
    }
}

impl<T: Observe> Default for ObservedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Observe> Observe for ObservedVec<T> {
    fn make_observable(&mut self) {
        let len = self.items.len();
        self.observe_range(0..len);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
