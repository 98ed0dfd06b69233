//! Stack growth for the recursive passes over syntax trees and for nested
//! searches.
//!
//! Patterns can nest groups up to the configured maximum depth, which is
//! deeper than what fits in the default stack of a spawned thread when every
//! level goes through several frames of the parser, the compiler and the
//! executors.

/// If less than this remains, the stack is grown.
const RED_ZONE: usize = 100 * 1024;

/// Stack space allocated on every growth.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Runs `f`, allocating more stack first if the remaining stack is below
/// the red zone.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
