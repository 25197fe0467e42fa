//! Root registries and the root-scanning pass.
//!
//! `LocalRoots`/`BignumRoots` are append-only stacks of raw pointers back
//! into the mutator's own stack frames or fields — the same shape as the
//! original's `gc_locals`/`gc_bignums` intrusive lists, expressed here as
//! `Vec<*mut _>` guarded by an RAII handle so a caller cannot forget to
//! unregister one. Registering a local is inherently unsafe: the caller
//! must guarantee the referenced storage outlives the guard and is never
//! moved while registered.

use crate::context::ContextChain;
use crate::copier::{copy_handle, CollectingGen, TraceStats};
use crate::generation::{GenKind, Heap};
use crate::hooks::{CodeHeap, ObjectModel};
use crate::object::{Address, Cell};
use crate::zone::NewspaceFull;

/// A stack of raw pointers to live `Cell` locals, each rewritten in place
/// during root scanning if it turns out to hold a pointer that moved.
#[derive(Debug, Default)]
pub struct LocalRoots {
    ptrs: Vec<*mut Cell>,
}

impl LocalRoots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cell` as a root for as long as the returned guard lives.
    ///
    /// # Safety
    /// `cell` must remain valid and un-moved for the guard's entire
    /// lifetime.
    pub unsafe fn register<'a>(&'a mut self, cell: &'a mut Cell) -> LocalRootGuard<'a> {
        self.ptrs.push(cell);
        LocalRootGuard {
            roots: self,
            expected: cell,
        }
    }

    fn update_all(&mut self, mut update: impl FnMut(Cell) -> Result<Cell, NewspaceFull>) -> Result<(), NewspaceFull> {
        for ptr in &self.ptrs {
            // SAFETY: every pointer in `ptrs` was registered along with a
            // `LocalRootGuard` that guarantees its referent is still live.
            let slot = unsafe { &mut **ptr };
            *slot = update(*slot)?;
        }
        Ok(())
    }
}

/// RAII pop for a `LocalRoots` registration. Must be dropped in the exact
/// reverse order of registration (stack discipline); debug-asserts this.
pub struct LocalRootGuard<'a> {
    roots: &'a mut LocalRoots,
    expected: *mut Cell,
}

impl Drop for LocalRootGuard<'_> {
    fn drop(&mut self) {
        let popped = self.roots.ptrs.pop();
        debug_assert_eq!(popped, Some(self.expected), "local roots must unregister in stack order");
    }
}

/// A stack of raw pointers to bignum handles. Bignums are opaque to the
/// core beyond "an untagged heap address that must be copied and
/// rewritten if present"; a null entry is skipped.
#[derive(Debug, Default)]
pub struct BignumRoots {
    ptrs: Vec<*mut Option<Address>>,
}

impl BignumRoots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bignum handle slot as a root for as long as the
    /// returned guard lives.
    ///
    /// # Safety
    /// `slot` must remain valid and un-moved for the guard's entire
    /// lifetime.
    pub unsafe fn register<'a>(&'a mut self, slot: &'a mut Option<Address>) -> BignumRootGuard<'a> {
        self.ptrs.push(slot);
        BignumRootGuard {
            roots: self,
            expected: slot,
        }
    }

    fn update_all(&mut self, mut update: impl FnMut(Address) -> Result<Address, NewspaceFull>) -> Result<(), NewspaceFull> {
        for ptr in &self.ptrs {
            // SAFETY: see `LocalRoots::update_all`.
            let slot = unsafe { &mut **ptr };
            if let Some(addr) = *slot {
                *slot = Some(update(addr)?);
            }
        }
        Ok(())
    }
}

/// RAII pop for a `BignumRoots` registration.
pub struct BignumRootGuard<'a> {
    roots: &'a mut BignumRoots,
    expected: *mut Option<Address>,
}

impl Drop for BignumRootGuard<'_> {
    fn drop(&mut self) {
        let popped = self.roots.ptrs.pop();
        debug_assert_eq!(popped, Some(self.expected), "bignum roots must unregister in stack order");
    }
}

/// Everything `copy_roots` needs beyond the registries themselves:
/// interned constants and the user-visible environment array, both owned
/// by the VM but passed in by reference so this module stays independent
/// of `vm::Vm`.
pub struct RootSet<'a> {
    pub constants: &'a mut [Cell],
    pub locals: &'a mut LocalRoots,
    pub bignums: &'a mut BignumRoots,
    pub contexts: &'a mut ContextChain,
    pub user_env: &'a mut [Cell],
}

#[allow(clippy::too_many_arguments)]
fn copy_cell(
    heap: &mut Heap,
    collecting: CollectingGen,
    newspace_kind: GenKind,
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
    stats: &mut TraceStats,
    cell: Cell,
) -> Result<Cell, NewspaceFull> {
    let (updated, bytes) = copy_handle(heap, collecting, newspace_kind, object_model, code_heap, cell)?;
    if bytes > 0 {
        stats.bytes_copied += bytes;
        stats.object_count += 1;
    }
    Ok(updated)
}

/// Walk every root in the order the specification fixes: constants,
/// registered locals, registered bignums, then (the core never compacts,
/// so this branch always runs) every context's stacks and saved
/// registers, then the user environment array.
pub fn copy_roots(
    heap: &mut Heap,
    collecting: CollectingGen,
    newspace_kind: GenKind,
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
    roots: &mut RootSet<'_>,
) -> Result<TraceStats, NewspaceFull> {
    let mut stats = TraceStats::default();

    for slot in roots.constants.iter_mut() {
        *slot = copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, *slot)?;
    }

    roots
        .locals
        .update_all(|cell| copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, cell))?;

    roots.bignums.update_all(|addr| {
        let updated = copy_cell(
            heap,
            collecting,
            newspace_kind,
            object_model,
            code_heap,
            &mut stats,
            Cell::from_address(addr),
        )?;
        Ok(updated.as_address().unwrap_or(addr))
    })?;

    roots.contexts.save_stacks();
    for ctx in roots.contexts.iter_mut() {
        for cell in ctx.datastack_live_mut() {
            *cell = copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, *cell)?;
        }
        for cell in ctx.retainstack_live_mut() {
            *cell = copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, *cell)?;
        }
        ctx.catchstack_save =
            copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, ctx.catchstack_save)?;
        ctx.current_callback_save = copy_cell(
            heap,
            collecting,
            newspace_kind,
            object_model,
            code_heap,
            &mut stats,
            ctx.current_callback_save,
        )?;
        code_heap.mark_active_blocks();
    }

    for slot in roots.user_env.iter_mut() {
        *slot = copy_cell(heap, collecting, newspace_kind, object_model, code_heap, &mut stats, *slot)?;
    }

    Ok(stats)
}
