use crate::{Computation, Dependency};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

type AfterFlush = Box<dyn FnOnce()>;

pub(crate) struct TrackerInner {
    pub(crate) current: RefCell<Option<Computation>>,
    pub(crate) pending: RefCell<VecDeque<Computation>>,
    after_flush: RefCell<VecDeque<AfterFlush>>,
    flushing: Cell<bool>,
    next_id: Cell<u64>,
}

/// Owner of the reactive context: the current computation, the queue of
/// invalidated computations and the after-flush queue.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) inner: Rc<TrackerInner>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                current: RefCell::new(None),
                pending: RefCell::new(VecDeque::new()),
                after_flush: RefCell::new(VecDeque::new()),
                flushing: Cell::new(false),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Run `func` now inside a new computation, and again after every flush
    /// that follows an invalidation of it.
    ///
    /// A computation started from inside another one is stopped when the
    /// outer computation is invalidated.
    pub fn autorun<F>(&self, func: F) -> Computation
    where
        F: FnMut(&Computation) + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let computation = Computation::new(id, Rc::downgrade(&self.inner), Box::new(func));

        if let Some(parent) = self.current_computation() {
            let child = computation.clone();
            parent.on_invalidate(move |_| child.stop());
        }

        computation.compute();
        computation
    }

    /// A new dependency bound to this tracker.
    pub fn dependency(&self) -> Dependency {
        Dependency::new(self)
    }

    /// Whether code is currently running inside a computation.
    pub fn active(&self) -> bool {
        self.inner.current.borrow().is_some()
    }

    pub fn current_computation(&self) -> Option<Computation> {
        self.inner.current.borrow().clone()
    }

    /// Register `hook` on the current computation. Returns false when no
    /// computation is active.
    pub fn on_invalidate<F>(&self, hook: F) -> bool
    where
        F: FnOnce(&Computation) + 'static,
    {
        match self.current_computation() {
            Some(computation) => {
                computation.on_invalidate(hook);
                true
            }
            None => false,
        }
    }

    /// Schedule `func` to run during the next flush, after every pending
    /// computation has re-run.
    pub fn after_flush<F>(&self, func: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.after_flush.borrow_mut().push_back(Box::new(func));
    }

    /// Run `func` with no current computation, so nothing it reads is tracked.
    pub fn nonreactive<R>(&self, func: impl FnOnce() -> R) -> R {
        let previous = self.inner.current.replace(None);
        let result = func();
        self.inner.current.replace(previous);
        result
    }

    /// Whether invalidated computations or after-flush callbacks are queued.
    pub fn has_pending_work(&self) -> bool {
        !self.inner.pending.borrow().is_empty() || !self.inner.after_flush.borrow().is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.get()
    }

    /// Re-run invalidated computations, then drain after-flush callbacks one
    /// at a time, re-running any computation they invalidate before the next
    /// callback. Re-entrant calls are no-ops.
    pub fn flush(&self) {
        if self.inner.flushing.replace(true) {
            return;
        }
        let _reset = FlushingReset(&self.inner.flushing);

        let mut reruns = 0usize;
        let mut callbacks = 0usize;
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            if let Some(computation) = next {
                computation.recompute();
                reruns += 1;
                continue;
            }

            let next = self.inner.after_flush.borrow_mut().pop_front();
            match next {
                Some(callback) => {
                    callback();
                    callbacks += 1;
                }
                None => break,
            }
        }

        if reruns > 0 || callbacks > 0 {
            trace!(reruns, callbacks, "tracker flushed");
        }
    }

    pub(crate) fn from_inner(inner: Rc<TrackerInner>) -> Self {
        Self { inner }
    }
}

struct FlushingReset<'a>(&'a Cell<bool>);

impl Drop for FlushingReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
