//! Error types raised at the core's public boundary.

use thiserror::Error;

/// Errors the core can raise back to a hosted-language caller or embedder.
///
/// Every variant here corresponds to a row in the error-handling table of
/// the specification this crate implements: stack underflow is recoverable
/// and meant to be caught by hosted code, the rest are fatal conditions the
/// embedder is expected to treat as unrecoverable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// `stack_to_array` observed `top < bottom - CELLS` on the data stack.
    #[error("data stack underflow")]
    DsUnderflow,
    /// `stack_to_array` observed `top < bottom - CELLS` on the retain stack.
    #[error("retain stack underflow")]
    RsUnderflow,
    /// A collection was requested while GC is disabled.
    #[error("garbage collection is disabled")]
    GcDisabled,
    /// `become` was called with arrays of unequal length.
    #[error("become: old and new arrays must have equal length")]
    BecomeLengthMismatch,
    /// An internal heap-sanity invariant failed (debug builds only normally
    /// catch this via `debug_assert!`; this variant exists so release
    /// builds that opt into the checks can still report it through
    /// `Result` rather than aborting).
    #[error("heap sanity check failed: {0}")]
    HeapSanityFailure(&'static str),
    /// The collector driver reached a generation it has no legal next step
    /// for: either a caller requested `Aging` on a heap built without
    /// `HAS_AGING`, or `Tenured` overflowed again even after a heap-growth
    /// retry, leaving the escalation ladder with nowhere left to go.
    #[error("invalid or unreachable generation in collector driver")]
    BadGeneration,
}
