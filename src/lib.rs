//! `corevm-cli`: a small demo host around `corevm-core`.
//!
//! This crate is not part of the GC/context core itself — it exists to
//! give the core something real to run against: a toy `ObjectModel`
//! (cons-cell pairs) and a no-op `CodeHeap`, wired into a command-line
//! tool that can run a collection and print its stats.

use corevm_core::hooks::{CodeHeap, ObjectModel};
use corevm_core::object::{Address, Cell, CELL_BYTES};
use corevm_core::zone::Zone;

/// A minimal object model for the demo: every object is a two-cell cons
/// pair (`car`, `cdr`), both traced, no binary payload. Just enough shape
/// for `demo` to build a small chain and watch it get promoted.
#[derive(Debug, Default)]
pub struct ConsModel;

/// Size, in bytes, of one cons cell (`car` + `cdr`).
pub const CONS_CELL_BYTES: usize = 2 * CELL_BYTES;

impl ObjectModel for ConsModel {
    fn untagged_object_size(&self, _zone: &Zone, _addr: Address) -> usize {
        CONS_CELL_BYTES
    }

    fn binary_payload_start(&self, _zone: &Zone, _addr: Address) -> usize {
        CONS_CELL_BYTES
    }

    fn trace(&self, _zone: &Zone, _addr: Address) -> Vec<usize> {
        vec![0, CELL_BYTES]
    }
}

/// A code heap with nothing in it: this demo never compiles code, so every
/// hook is a no-op.
#[derive(Debug, Default)]
pub struct NoCodeHeap;

impl CodeHeap for NoCodeHeap {
    fn copy_code_heap_roots(&mut self, _copy_handle: &mut dyn FnMut(Address) -> Address) {}
    fn mark_active_blocks(&mut self) {}
    fn mark_object_code_block(&mut self, _addr: Address) {}
    fn free_unmarked(&mut self) {}
    fn unmark_marked(&mut self) {}
    fn compile_all_words(&mut self) {}
}

/// Build a chain of `length` cons cells in the nursery, each pointing at
/// the previous one, and return a root `Cell` pointing at the head.
///
/// # Panics
/// Panics if the nursery cannot fit `length` cons cells (the demo's config
/// always sizes the nursery generously enough).
#[must_use]
pub fn build_cons_chain(vm: &mut corevm_core::Vm, length: usize) -> Cell {
    let mut tail = Cell::immediate(0);
    for _ in 0..length {
        let obj = vm
            .heap_mut()
            .get_mut(corevm_core::generation::GenKind::Nursery)
            .expect("nursery always present")
            .active_mut()
            .allot(CONS_CELL_BYTES)
            .expect("demo nursery sized generously enough for its own chain");
        vm.heap_mut()
            .get_mut(corevm_core::generation::GenKind::Nursery)
            .expect("nursery always present")
            .active_mut()
            .write_word(obj, 0);
        vm.heap_mut()
            .get_mut(corevm_core::generation::GenKind::Nursery)
            .expect("nursery always present")
            .active_mut()
            .write_word(obj.offset(CELL_BYTES), tail.0);
        tail = Cell::from_address(obj);
    }
    tail
}
