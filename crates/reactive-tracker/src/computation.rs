use crate::tracker::{Tracker, TrackerInner};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type ComputeFn = Box<dyn FnMut(&Computation)>;
type Hook = Box<dyn FnOnce(&Computation)>;

struct ComputationInner {
    id: u64,
    tracker: Weak<TrackerInner>,
    func: RefCell<Option<ComputeFn>>,
    invalidated: Cell<bool>,
    stopped: Cell<bool>,
    first_run: Cell<bool>,
    recomputing: Cell<bool>,
    invalidate_hooks: RefCell<Vec<Hook>>,
    stop_hooks: RefCell<Vec<Hook>>,
}

/// A function that re-runs whenever something it read changes.
///
/// Cloning yields another handle to the same computation.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<ComputationInner>,
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("invalidated", &self.inner.invalidated.get())
            .field("stopped", &self.inner.stopped.get())
            .finish()
    }
}

impl Computation {
    pub(crate) fn new(id: u64, tracker: Weak<TrackerInner>, func: ComputeFn) -> Self {
        Self {
            inner: Rc::new(ComputationInner {
                id,
                tracker,
                func: RefCell::new(Some(func)),
                invalidated: Cell::new(false),
                stopped: Cell::new(false),
                first_run: Cell::new(true),
                recomputing: Cell::new(false),
                invalidate_hooks: RefCell::new(Vec::new()),
                stop_hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// True only during the initial run started by [`Tracker::autorun`].
    pub fn first_run(&self) -> bool {
        self.inner.first_run.get()
    }

    pub fn invalidated(&self) -> bool {
        self.inner.invalidated.get()
    }

    pub fn stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    /// Run `hook` when this computation is next invalidated, or right away
    /// if it already is.
    pub fn on_invalidate<F>(&self, hook: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.invalidated() {
            self.run_hook(Box::new(hook));
        } else {
            self.inner.invalidate_hooks.borrow_mut().push(Box::new(hook));
        }
    }

    /// Run `hook` when this computation stops, or right away if it already has.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: FnOnce(&Computation) + 'static,
    {
        if self.stopped() {
            self.run_hook(Box::new(hook));
        } else {
            self.inner.stop_hooks.borrow_mut().push(Box::new(hook));
        }
    }

    /// Mark the computation stale: queue a re-run for the next flush and fire
    /// the invalidation hooks. Repeated calls before the re-run are no-ops.
    pub fn invalidate(&self) {
        if self.inner.invalidated.replace(true) {
            return;
        }

        if !self.inner.recomputing.get() && !self.stopped() {
            if let Some(tracker) = self.inner.tracker.upgrade() {
                tracker.pending.borrow_mut().push_back(self.clone());
            }
        }

        let hooks = std::mem::take(&mut *self.inner.invalidate_hooks.borrow_mut());
        for hook in hooks {
            self.run_hook(hook);
        }
    }

    /// Invalidate and never re-run again.
    pub fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        self.invalidate();

        let hooks = std::mem::take(&mut *self.inner.stop_hooks.borrow_mut());
        for hook in hooks {
            self.run_hook(hook);
        }
        self.inner.func.borrow_mut().take();
    }

    pub(crate) fn compute(&self) {
        self.inner.invalidated.set(false);

        let Some(tracker) = self.inner.tracker.upgrade() else {
            return;
        };
        // Taken out for the duration of the run so the body may freely
        // re-enter this computation's other methods.
        let Some(mut func) = self.inner.func.borrow_mut().take() else {
            return;
        };

        let previous = tracker.current.replace(Some(self.clone()));
        func(self);
        tracker.current.replace(previous);

        if !self.stopped() {
            *self.inner.func.borrow_mut() = Some(func);
        }
        self.inner.first_run.set(false);
    }

    pub(crate) fn recompute(&self) {
        self.inner.recomputing.set(true);
        if self.needs_recompute() {
            self.compute();
        }
        self.inner.recomputing.set(false);

        // Invalidated by its own run: go again before anything else.
        if self.needs_recompute() {
            if let Some(tracker) = self.inner.tracker.upgrade() {
                tracker.pending.borrow_mut().push_front(self.clone());
            }
        }
    }

    fn needs_recompute(&self) -> bool {
        self.invalidated() && !self.stopped()
    }

    fn run_hook(&self, hook: Hook) {
        match self.inner.tracker.upgrade() {
            Some(inner) => Tracker::from_inner(inner).nonreactive(|| hook(self)),
            None => hook(self),
        }
    }
}
