//! Single-threaded reactive invalidation.
//!
//! A [`Tracker`] runs [`Computation`]s. While a computation runs, every
//! [`Dependency::depend`] call links that dependency to it; a later
//! [`Dependency::changed`] invalidates the computation and queues it for a
//! re-run. Nothing re-runs on its own: the owner drains the queue with
//! [`Tracker::flush`], which re-runs invalidated computations and then the
//! callbacks registered with [`Tracker::after_flush`].
//!
//! ```text
//! dep.changed() ──► computation invalidated ──► on_invalidate hooks run
//!                                                │
//! tracker.flush() ─► re-run pending computations ┘─► after_flush callbacks
//! ```
//!
//! Everything here is `!Send`: handles are `Rc`-based and meant to live on
//! one thread next to the code that owns them.

mod computation;
mod dependency;
mod tracker;

pub use computation::Computation;
pub use dependency::Dependency;
pub use tracker::Tracker;

#[cfg(test)]
mod tests;
