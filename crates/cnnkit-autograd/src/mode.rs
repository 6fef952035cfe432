//! Execution Mode - Scoped Training / Evaluating Switch
//!
//! A tagged two-state mode held per thread. `Training` records the
//! computation graph and enables stochastic ops such as dropout.
//! `Evaluating` records nothing and makes every mode-dependent op
//! deterministic.
//!
//! The mode is only ever changed through a guard, so leaving a scope (by
//! return, `?` or unwinding) always restores the previous mode.
//!
//! # Example
//! ```rust
//! use cnnkit_autograd::{current_mode, is_grad_enabled, Mode, NoGradGuard};
//!
//! assert_eq!(current_mode(), Mode::Training);
//! {
//!     let _guard = NoGradGuard::new();
//!     assert!(!is_grad_enabled());
//! }
//! assert!(is_grad_enabled());
//! ```
//!
//! @version 0.1.0

use std::cell::Cell;
use std::marker::PhantomData;

// =============================================================================
// Mode
// =============================================================================

/// Whether operations record gradients and apply training-only behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Graph recording on; dropout active.
    #[default]
    Training,
    /// Graph recording off; dropout is the identity.
    Evaluating,
}

impl Mode {
    /// Returns true for [`Mode::Training`].
    #[must_use]
    pub const fn is_training(self) -> bool {
        matches!(self, Self::Training)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Training => write!(f, "training"),
            Self::Evaluating => write!(f, "evaluating"),
        }
    }
}

thread_local! {
    static MODE: Cell<Mode> = const { Cell::new(Mode::Training) };
}

/// Returns the mode of the current thread.
#[must_use]
pub fn current_mode() -> Mode {
    MODE.with(Cell::get)
}

/// Returns whether operations currently record gradients.
#[must_use]
pub fn is_grad_enabled() -> bool {
    current_mode().is_training()
}

// =============================================================================
// Guards
// =============================================================================

/// RAII guard that sets the mode for its lifetime and restores the previous
/// mode on drop. Guards nest; each restores exactly what it replaced.
///
/// The guard is tied to the thread that created it.
#[must_use = "the mode is restored as soon as the guard is dropped"]
pub struct ModeGuard {
    prev: Mode,
    _not_send: PhantomData<*const ()>,
}

impl ModeGuard {
    /// Enters `mode`.
    pub fn enter(mode: Mode) -> Self {
        let prev = MODE.with(|m| m.replace(mode));
        Self {
            prev,
            _not_send: PhantomData,
        }
    }

    /// The mode that will be restored on drop.
    #[must_use]
    pub fn previous(&self) -> Mode {
        self.prev
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        MODE.with(|m| m.set(self.prev));
    }
}

/// Guard that enters [`Mode::Evaluating`]: no graph, deterministic ops.
#[must_use = "the mode is restored as soon as the guard is dropped"]
pub struct NoGradGuard {
    _inner: ModeGuard,
}

impl NoGradGuard {
    /// Disables gradient recording until the guard is dropped.
    pub fn new() -> Self {
        Self {
            _inner: ModeGuard::enter(Mode::Evaluating),
        }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Alias used by the evaluation phase of a training loop.
pub type EvalGuard = NoGradGuard;

/// Guard that enters [`Mode::Training`] inside an evaluating scope.
#[must_use = "the mode is restored as soon as the guard is dropped"]
pub struct EnableGradGuard {
    _inner: ModeGuard,
}

impl EnableGradGuard {
    /// Enables gradient recording until the guard is dropped.
    pub fn new() -> Self {
        Self {
            _inner: ModeGuard::enter(Mode::Training),
        }
    }
}

impl Default for EnableGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Closure Forms
// =============================================================================

/// Runs `f` in [`Mode::Evaluating`].
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = NoGradGuard::new();
    f()
}

/// Runs `f` in [`Mode::Training`].
pub fn enable_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = EnableGradGuard::new();
    f()
}

/// Runs `f` in `mode`.
pub fn with_mode<F, R>(mode: Mode, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ModeGuard::enter(mode);
    f()
}

// =============================================================================
// Tests
// =============================================================================
