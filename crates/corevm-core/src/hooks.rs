//! External interface traits.
//!
//! The collector and context manager understand zones, cards, and stacks,
//! but they do not understand object layout, code compilation, or wall
//! time. Those live on the other side of these trait boundaries, supplied
//! by whatever embeds `corevm-core`. Grounded in the teacher's
//! `otterc_ffi` boundary traits, which separate "what the runtime core
//! owns" from "what a foreign collaborator supplies".

use crate::error::CoreError;
use crate::object::Address;
use crate::zone::Zone;

/// What the collector needs to know about live objects in order to trace
/// and relocate them. The core never interprets a payload's bytes beyond
/// this trait's surface.
pub trait ObjectModel {
    /// Size in bytes of the object at `addr`, header included, before any
    /// tag bits are stripped. Used to know how far to bump the scan
    /// cursor past this object during `copy_reachable_objects`.
    fn untagged_object_size(&self, zone: &Zone, addr: Address) -> usize;

    /// Offset from `addr` at which this object's binary (non-traced)
    /// payload starts, if any. Bytes from this offset to the end of the
    /// object (per `untagged_object_size`) are copied verbatim and never
    /// handed to `trace`.
    fn binary_payload_start(&self, zone: &Zone, addr: Address) -> usize;

    /// Every traced cell offset (in bytes, from `addr`) that holds a
    /// pointer the collector must follow and potentially rewrite. Offsets
    /// at or past `binary_payload_start` are never returned here.
    fn trace(&self, zone: &Zone, addr: Address) -> Vec<usize>;
}

/// The code heap that compiles hosted-language words into machine code.
/// The collector only needs enough of it to keep literals embedded in
/// compiled code alive and to reclaim code blocks nothing references
/// anymore.
pub trait CodeHeap {
    /// Copy every code-block literal that is itself a GC root, via
    /// `copy_handle`-style relocation, as part of `roots::copy_roots`.
    fn copy_code_heap_roots(&mut self, copy_handle: &mut dyn FnMut(Address) -> Address);

    /// Mark every code block reachable from currently-executing or
    /// otherwise-active call frames.
    fn mark_active_blocks(&mut self);

    /// Mark one code block (and everything it references) as live,
    /// called while tracing an object that embeds a code-block pointer.
    fn mark_object_code_block(&mut self, addr: Address);

    /// Free every code block that mark_active_blocks / mark_object_code_block
    /// did not mark this collection.
    fn free_unmarked(&mut self);

    /// Clear every mark bit set this collection, in preparation for the
    /// next one.
    fn unmark_marked(&mut self);

    /// Recompile every known word. Used only by the full, non-generational
    /// path (image load, `compile-all`); never called mid-collection.
    fn compile_all_words(&mut self);
}

/// Observes every error the core raises. Folded into `CoreError` +
/// `Result` at the Rust API boundary, but still exposed as a trait for a
/// collaborator that wants to log or surface errors as they occur (a REPL,
/// say), rather than only at the call site that receives the `Result`.
pub trait ErrorSink {
    /// A recoverable condition occurred (e.g. a checked datastack
    /// mismatch).
    fn general_error(&mut self, error: &CoreError);

    /// An unrecoverable condition occurred; the embedding process should
    /// treat this as a die-with-diagnostics situation.
    fn critical_error(&mut self, error: &CoreError);
}

/// A source of monotonic wall-clock microseconds, injected so GC timing
/// statistics (`GcStats`) can be tested deterministically instead of
/// depending on `std::time::Instant` directly.
pub trait Clock {
    /// Microseconds since an arbitrary, implementation-defined epoch.
    /// Only differences between two calls are meaningful.
    fn current_micros(&self) -> u64;
}

/// A `Clock` backed by `std::time::Instant`, for production use.
#[derive(Debug, Default)]
pub struct SystemClock {
    epoch: once_cell::sync::OnceCell<std::time::Instant>,
}

impl Clock for SystemClock {
    fn current_micros(&self) -> u64 {
        let epoch = self.epoch.get_or_init(std::time::Instant::now);
        u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
