//! Stack growth for the recursive passes
//!
//! Parsing, evaluation and compilation recurse once per tree level, and user
//! functions add more levels per call. [`ensure_sufficient_stack`] moves the
//! rest of a deep recursion onto a fresh heap-allocated segment before the
//! native stack runs out.

/// Grow when less than this is left.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
