use crate::tracker::TrackerInner;
use crate::{Computation, Tracker};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// A reactive data source. Computations that call [`depend`](Self::depend)
/// are invalidated by the next [`changed`](Self::changed).
#[derive(Clone)]
pub struct Dependency {
    tracker: Weak<TrackerInner>,
    dependents: Rc<RefCell<BTreeMap<u64, Computation>>>,
}

impl Dependency {
    pub fn new(tracker: &Tracker) -> Self {
        Self {
            tracker: Rc::downgrade(&tracker.inner),
            dependents: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Link the current computation, if any, to this dependency. Returns
    /// true only when a new link was made.
    pub fn depend(&self) -> bool {
        let Some(tracker) = self.tracker.upgrade() else {
            return false;
        };
        let Some(computation) = tracker.current.borrow().clone() else {
            return false;
        };

        let id = computation.id();
        if self.dependents.borrow().contains_key(&id) {
            return false;
        }
        self.dependents.borrow_mut().insert(id, computation.clone());

        let dependents = Rc::downgrade(&self.dependents);
        computation.on_invalidate(move |c| {
            if let Some(dependents) = dependents.upgrade() {
                dependents.borrow_mut().remove(&c.id());
            }
        });
        true
    }

    /// Invalidate every computation currently depending on this.
    pub fn changed(&self) {
        let dependents: Vec<Computation> = self.dependents.borrow().values().cloned().collect();
        for computation in dependents {
            computation.invalidate();
        }
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.borrow().is_empty()
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &self.dependents.borrow().len())
            .finish()
    }
}
