use crate::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

#[test]
fn autorun_runs_immediately_and_reruns_after_flush() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let runs = counter();

    let (d, r) = (dep.clone(), runs.clone());
    let computation = tracker.autorun(move |_| {
        d.depend();
        r.set(r.get() + 1);
    });
    assert_eq!(runs.get(), 1);
    assert!(!computation.first_run());

    dep.changed();
    assert!(computation.invalidated());
    assert_eq!(runs.get(), 1, "nothing re-runs before flush");

    tracker.flush();
    assert_eq!(runs.get(), 2);
    assert!(!computation.invalidated());
}

#[test]
fn first_run_flag_is_only_set_during_initial_run() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (d, s) = (dep.clone(), seen.clone());
    tracker.autorun(move |c| {
        d.depend();
        s.borrow_mut().push(c.first_run());
    });
    dep.changed();
    tracker.flush();

    assert_eq!(*seen.borrow(), vec![true, false]);
}

#[test]
fn depend_links_once_per_run() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let links = Rc::new(RefCell::new(Vec::new()));

    let (d, l) = (dep.clone(), links.clone());
    tracker.autorun(move |_| {
        l.borrow_mut().push(d.depend());
        l.borrow_mut().push(d.depend());
    });

    assert_eq!(*links.borrow(), vec![true, false]);
    assert!(dep.has_dependents());
    assert!(!dep.depend(), "no computation outside autorun");
}

#[test]
fn invalidation_unlinks_dependents() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let other = tracker.dependency();

    let (d, o) = (dep.clone(), other.clone());
    let flag = Rc::new(Cell::new(true));
    let f = flag.clone();
    tracker.autorun(move |_| {
        if f.get() {
            d.depend();
        } else {
            o.depend();
        }
    });
    assert!(dep.has_dependents());

    flag.set(false);
    dep.changed();
    tracker.flush();

    assert!(!dep.has_dependents());
    assert!(other.has_dependents());
}

#[test]
fn on_invalidate_hooks_fire_synchronously_outside_any_computation() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let fired = counter();
    let active_during_hook = Rc::new(Cell::new(true));

    let (d, f, a, t) = (
        dep.clone(),
        fired.clone(),
        active_during_hook.clone(),
        tracker.clone(),
    );
    tracker.autorun(move |_| {
        d.depend();
        let (f, a, t) = (f.clone(), a.clone(), t.clone());
        assert!(t.clone().on_invalidate(move |_| {
            f.set(f.get() + 1);
            a.set(t.active());
        }));
    });

    dep.changed();
    assert_eq!(fired.get(), 1);
    assert!(!active_during_hook.get());
}

#[test]
fn on_invalidate_without_computation_is_rejected() {
    let tracker = Tracker::new();
    assert!(!tracker.active());
    assert!(!tracker.on_invalidate(|_| panic!("must not run")));
}

#[test]
fn after_flush_runs_after_pending_reruns() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let log = Rc::new(RefCell::new(Vec::new()));

    let (d, l) = (dep.clone(), log.clone());
    tracker.autorun(move |c| {
        d.depend();
        l.borrow_mut().push(if c.first_run() { "run" } else { "rerun" });
    });

    let l = log.clone();
    tracker.after_flush(move || l.borrow_mut().push("after"));
    dep.changed();
    tracker.flush();

    assert_eq!(*log.borrow(), vec!["run", "rerun", "after"]);
    assert!(!tracker.has_pending_work());
}

#[test]
fn after_flush_callbacks_can_invalidate_and_flush_continues() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let runs = counter();

    let (d, r) = (dep.clone(), runs.clone());
    tracker.autorun(move |_| {
        d.depend();
        r.set(r.get() + 1);
    });

    let d = dep.clone();
    tracker.after_flush(move || d.changed());
    tracker.flush();

    assert_eq!(runs.get(), 2);
}

#[test]
fn stopped_computation_never_reruns() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let runs = counter();
    let stopped = counter();

    let (d, r) = (dep.clone(), runs.clone());
    let computation = tracker.autorun(move |_| {
        d.depend();
        r.set(r.get() + 1);
    });
    let s = stopped.clone();
    computation.on_stop(move |_| s.set(s.get() + 1));

    computation.stop();
    computation.stop();
    dep.changed();
    tracker.flush();

    assert_eq!(runs.get(), 1);
    assert_eq!(stopped.get(), 1);
    assert!(computation.stopped());
}

#[test]
fn nested_autorun_is_stopped_when_parent_reruns() {
    let tracker = Tracker::new();
    let outer_dep = tracker.dependency();
    let inner_dep = tracker.dependency();
    let inner_runs = counter();

    let (t, od, id, ir) = (
        tracker.clone(),
        outer_dep.clone(),
        inner_dep.clone(),
        inner_runs.clone(),
    );
    tracker.autorun(move |_| {
        od.depend();
        let (id, ir) = (id.clone(), ir.clone());
        t.autorun(move |_| {
            id.depend();
            ir.set(ir.get() + 1);
        });
    });
    assert_eq!(inner_runs.get(), 1);

    outer_dep.changed();
    tracker.flush();
    assert_eq!(inner_runs.get(), 2, "fresh inner computation created");

    inner_dep.changed();
    tracker.flush();
    assert_eq!(inner_runs.get(), 3, "only the live inner computation reruns");
}

#[test]
fn nonreactive_reads_are_not_tracked() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let runs = counter();

    let (t, d, r) = (tracker.clone(), dep.clone(), runs.clone());
    tracker.autorun(move |_| {
        t.nonreactive(|| d.depend());
        r.set(r.get() + 1);
    });

    dep.changed();
    tracker.flush();
    assert_eq!(runs.get(), 1);
    assert!(!dep.has_dependents());
}

#[test]
fn self_invalidation_during_rerun_is_requeued() {
    let tracker = Tracker::new();
    let dep = tracker.dependency();
    let runs = counter();

    let (d, r) = (dep.clone(), runs.clone());
    tracker.autorun(move |c| {
        d.depend();
        r.set(r.get() + 1);
        if r.get() == 2 {
            c.invalidate();
        }
    });

    dep.changed();
    tracker.flush();
    assert_eq!(runs.get(), 3);
}

#[test]
fn flush_is_not_reentrant() {
    let tracker = Tracker::new();
    let inner_calls = counter();

    let (t, c) = (tracker.clone(), inner_calls.clone());
    tracker.after_flush(move || {
        assert!(t.is_flushing());
        t.flush();
        c.set(c.get() + 1);
    });
    tracker.flush();

    assert_eq!(inner_calls.get(), 1);
    assert!(!tracker.is_flushing());
}
