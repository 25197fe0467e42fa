//! The VM: owns the heap, context chain, collector, and user environment,
//! and ties them together behind the primitive surface.
//!
//! Grounded in the teacher's `otterc_runtime::Runtime`, which holds the
//! same kind of "one mutable struct of everything a single-threaded
//! interpreter touches" plus a process-wide `OnceLock` accessor for
//! embeddings that want a singleton instead of threading `&mut Runtime`
//! through every call.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::collector::{Collector, GcStats};
use crate::config::CoreConfig;
use crate::context::ContextChain;
use crate::error::CoreError;
use crate::generation::Heap;
use crate::hooks::{CodeHeap, ObjectModel, SystemClock};
use crate::object::Cell;
use crate::roots::{BignumRoots, LocalRoots, RootSet};

/// Number of slots in the user-visible environment array. Matches the
/// specification's `userenv[0..USER_ENV)`; `CATCHSTACK_ENV` and
/// `CURRENT_CALLBACK_ENV` are the two slots `nest_stacks`/`unnest_stacks`
/// save and restore.
pub const USER_ENV_SLOTS: usize = 32;

/// Index of the catch-stack environment slot.
pub const CATCHSTACK_ENV: usize = 0;
/// Index of the current-callback environment slot.
pub const CURRENT_CALLBACK_ENV: usize = 1;

/// Everything a single mutator thread touches: heap, contexts, GC driver,
/// constants, and the user environment array. `!Sync` by construction (no
/// atomics anywhere in this struct or its fields) — see the concurrency
/// design note: the single `Mutex` around `the_vm()`'s singleton exists
/// purely so a caller can get `&'static` access without `unsafe`, not
/// because two threads are ever expected to hold it at once.
pub struct Vm {
    heap: Heap,
    contexts: ContextChain,
    collector: Collector,
    constants: Vec<Cell>,
    locals: LocalRoots,
    bignums: BignumRoots,
    user_env: Vec<Cell>,
    clock: SystemClock,
}

impl Vm {
    /// Build a VM from `config`, with fresh zones, one top-level context,
    /// and a zeroed user environment.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            heap: Heap::new(config),
            contexts: ContextChain::new(config),
            collector: Collector::new(),
            constants: vec![Cell(0); 4],
            locals: LocalRoots::new(),
            bignums: BignumRoots::new(),
            user_env: vec![Cell(0); USER_ENV_SLOTS],
            clock: SystemClock::default(),
        }
    }

    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[must_use]
    pub const fn contexts(&self) -> &ContextChain {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut ContextChain {
        &mut self.contexts
    }

    #[must_use]
    pub const fn gc_stats(&self) -> &GcStats {
        self.collector.stats()
    }

    pub fn clear_gc_stats(&mut self) {
        self.collector.clear_stats();
    }

    #[must_use]
    pub const fn gc_enabled(&self) -> bool {
        self.collector.is_enabled()
    }

    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.collector.set_enabled(enabled);
    }

    /// `gc`: synchronous full collection.
    ///
    /// Destructures `self` instead of calling a `&mut self` root-set
    /// helper: a helper method would borrow all of `self` opaquely, which
    /// conflicts with holding `&self.clock` across the same call. Field
    /// destructuring lets the borrow checker see the fields are disjoint.
    pub fn gc(&mut self, object_model: &dyn ObjectModel, code_heap: &mut dyn CodeHeap) -> Result<(), CoreError> {
        let Self {
            heap,
            contexts,
            collector,
            constants,
            locals,
            bignums,
            user_env,
            clock,
        } = self;
        let mut roots = RootSet {
            constants,
            locals,
            bignums,
            contexts,
            user_env,
        };
        collector.gc(heap, &mut roots, object_model, code_heap, &*clock)
    }

    /// `minor_gc`: nursery-only collection.
    pub fn minor_gc(&mut self, object_model: &dyn ObjectModel, code_heap: &mut dyn CodeHeap) -> Result<(), CoreError> {
        let Self {
            heap,
            contexts,
            collector,
            constants,
            locals,
            bignums,
            user_env,
            clock,
        } = self;
        let mut roots = RootSet {
            constants,
            locals,
            bignums,
            contexts,
            user_env,
        };
        collector.minor_gc(heap, &mut roots, object_model, code_heap, &*clock)
    }

    /// `nest_stacks`: enter a re-entrant foreign callback, saving the two
    /// userenv slots `unnest_stacks` must restore.
    pub fn nest_stacks(&mut self) {
        let catchstack = self.user_env[CATCHSTACK_ENV];
        let callback = self.user_env[CURRENT_CALLBACK_ENV];
        self.contexts.nest_stacks(catchstack, callback);
    }

    /// `unnest_stacks`: leave a callback, restoring the saved userenv
    /// slots.
    pub fn unnest_stacks(&mut self) {
        let (catchstack, callback) = self.contexts.unnest_stacks();
        self.user_env[CATCHSTACK_ENV] = catchstack;
        self.user_env[CURRENT_CALLBACK_ENV] = callback;
    }

    #[must_use]
    pub fn user_env(&self, slot: usize) -> Cell {
        self.user_env[slot]
    }

    pub fn set_user_env(&mut self, slot: usize, value: Cell) {
        self.user_env[slot] = value;
    }

    /// Register `cell` as a GC root for as long as the returned guard
    /// lives.
    ///
    /// # Safety
    /// See `LocalRoots::register`.
    pub unsafe fn register_local<'a>(&'a mut self, cell: &'a mut Cell) -> crate::roots::LocalRootGuard<'a> {
        unsafe { self.locals.register(cell) }
    }
}

/// A process-wide singleton `Vm`, matching the teacher's
/// `runtime::the_runtime()` accessor: a `OnceCell<Mutex<Vm>>` built from
/// `CoreConfig::from_env()` on first use. The mutex exists for API
/// convenience (so `&'static` access needs no `unsafe`), not because this
/// VM is ever touched from more than one thread at a time (§5).
static THE_VM: OnceCell<Mutex<Vm>> = OnceCell::new();

/// Access the process-wide `Vm`, building it from `CoreConfig::from_env()`
/// on first call.
pub fn the_vm() -> &'static Mutex<Vm> {
    THE_VM.get_or_init(|| Mutex::new(Vm::new(&CoreConfig::from_env())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Address, CELL_BYTES};
    use crate::zone::Zone;

    struct LeafModel;
    impl ObjectModel for LeafModel {
        fn untagged_object_size(&self, _zone: &Zone, _addr: Address) -> usize {
            CELL_BYTES
        }
        fn binary_payload_start(&self, _zone: &Zone, _addr: Address) -> usize {
            CELL_BYTES
        }
        fn trace(&self, _zone: &Zone, _addr: Address) -> Vec<usize> {
            Vec::new()
        }
    }

    struct NoCodeHeap;
    impl CodeHeap for NoCodeHeap {
        fn copy_code_heap_roots(&mut self, _copy_handle: &mut dyn FnMut(Address) -> Address) {}
        fn mark_active_blocks(&mut self) {}
        fn mark_object_code_block(&mut self, _addr: Address) {}
        fn free_unmarked(&mut self) {}
        fn unmark_marked(&mut self) {}
        fn compile_all_words(&mut self) {}
    }

    #[test]
    fn minor_gc_through_vm_updates_stats() {
        let mut vm = Vm::new(&CoreConfig {
            nursery_size: 128,
            aging_size: 256,
            tenured_size: 512,
            has_aging: true,
            ..CoreConfig::default()
        });
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;

        vm.minor_gc(&model, &mut code_heap).unwrap();
        assert_eq!(vm.gc_stats().generation(crate::generation::GenKind::Nursery).collections, 1);
    }

    #[test]
    fn nest_unnest_round_trips_userenv() {
        let mut vm = Vm::new(&CoreConfig::default());
        vm.set_user_env(CATCHSTACK_ENV, Cell::immediate(7));
        vm.set_user_env(CURRENT_CALLBACK_ENV, Cell::immediate(9));

        vm.nest_stacks();
        vm.set_user_env(CATCHSTACK_ENV, Cell::immediate(0));
        vm.unnest_stacks();

        assert_eq!(vm.user_env(CATCHSTACK_ENV), Cell::immediate(7));
        assert_eq!(vm.user_env(CURRENT_CALLBACK_ENV), Cell::immediate(9));
    }

    #[test]
    fn disabling_gc_surfaces_as_core_error() {
        let mut vm = Vm::new(&CoreConfig::default());
        vm.set_gc_enabled(false);
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;
        assert_eq!(vm.minor_gc(&model, &mut code_heap), Err(CoreError::GcDisabled));
    }
}
