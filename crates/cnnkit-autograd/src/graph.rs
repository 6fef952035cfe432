//! Graph Recording - Operation Node Accounting
//!
//! Nodes of the backward graph are owned by the variables that produced
//! them, so the graph is freed as soon as the loss goes out of scope. This
//! module only keeps a per-thread count of recorded operation nodes, which
//! makes "nothing was recorded" an observable property.
//!
//! @version 0.1.0

use std::cell::Cell;

thread_local! {
    static RECORDED: Cell<u64> = const { Cell::new(0) };
}

/// Notes that an operation node was added to the graph.
pub(crate) fn record_operation() {
    RECORDED.with(|c| c.set(c.get() + 1));
}

/// Total operation nodes recorded on this thread.
#[must_use]
pub fn recorded_operations() -> u64 {
    RECORDED.with(Cell::get)
}

/// Counts the operation nodes recorded while running `f`.
pub fn count_recorded<F, R>(f: F) -> (R, u64)
where
    F: FnOnce() -> R,
{
    let before = recorded_operations();
    let out = f();
    (out, recorded_operations() - before)
}
