//! The primitive surface (§4.7): thin, documented wrappers over `Vm` that
//! match the external operation names a hosted-language compiler binds
//! words to. Grounded in the teacher's `otterc_runtime::primitives`
//! module, which exposes its runtime the same way: one function per
//! `vm-primitive`-style word, each just validating and delegating.

use crate::error::CoreError;
use crate::hooks::{CodeHeap, ObjectModel};
use crate::object::{self, Cell};
use crate::vm::Vm;

/// `gc`: force a synchronous full collection.
///
/// # Errors
/// Returns [`CoreError::GcDisabled`] if collection has been disabled, or
/// [`CoreError::BadGeneration`] if the collector driver exhausts its
/// escalation path without completing.
pub fn gc(vm: &mut Vm, object_model: &dyn ObjectModel, code_heap: &mut dyn CodeHeap) -> Result<(), CoreError> {
    vm.gc(object_model, code_heap)
}

/// `minor_gc`: force a synchronous nursery-only collection.
///
/// # Errors
/// See [`gc`].
pub fn minor_gc(vm: &mut Vm, object_model: &dyn ObjectModel, code_heap: &mut dyn CodeHeap) -> Result<(), CoreError> {
    vm.minor_gc(object_model, code_heap)
}

/// `gc_stats`: a snapshot of the accumulated collector counters.
#[must_use]
pub fn gc_stats(vm: &Vm) -> crate::collector::GcStats {
    vm.gc_stats().clone()
}

/// `clear_gc_stats`: zero every accumulated counter.
pub fn clear_gc_stats(vm: &mut Vm) {
    vm.clear_gc_stats();
}

/// `enable_gc` / `disable_gc`: toggle whether `gc`/`minor_gc` actually run.
pub fn set_gc_enabled(vm: &mut Vm, enabled: bool) {
    vm.set_gc_enabled(enabled);
}

/// `datastack`: a snapshot of the current context's data stack, bottom to
/// top.
///
/// # Errors
/// Returns [`CoreError::DsUnderflow`] if the stack pointer has fallen into
/// corrupted territory.
pub fn datastack(vm: &Vm) -> Result<Vec<Cell>, CoreError> {
    vm.contexts().head().datastack()
}

/// `retainstack`: a snapshot of the current context's retain stack, bottom
/// to top.
///
/// # Errors
/// Returns [`CoreError::RsUnderflow`] on a corrupted stack pointer.
pub fn retainstack(vm: &Vm) -> Result<Vec<Cell>, CoreError> {
    vm.contexts().head().retainstack()
}

/// `set_datastack`: replace the current context's data stack contents.
pub fn set_datastack(vm: &mut Vm, cells: &[Cell]) {
    vm.contexts_mut().head_mut().set_datastack(cells);
}

/// `set_retainstack`: replace the current context's retain stack contents.
pub fn set_retainstack(vm: &mut Vm, cells: &[Cell]) {
    vm.contexts_mut().head_mut().set_retainstack(cells);
}

/// `check_datastack(array, in, out)`: verify the live data stack still has
/// the shape a cached `array` implies, given a word effect of `in` inputs
/// and `out` outputs.
#[must_use]
pub fn check_datastack(vm: &Vm, array: &[Cell], in_: usize, out: usize) -> bool {
    vm.contexts().head().check_datastack(array, in_, out)
}

/// `become(old, new)`: retarget every live reference to `old[i]` so it
/// resolves to `new[i]` instead, for each differing pair, then coalesce
/// those rewrites across the whole heap with a full collection and ask the
/// code heap to recompile every word against the new objects.
///
/// Mirrors `PRIMITIVE(become)`: install a forwarding pointer from each
/// differing `old[i]` onto `new[i]` directly on the heap, run `gc()` so
/// every root and every live reference gets rewritten through the usual
/// `resolve_forwarding`/`copy_handle` path, then `compile_all_words()`.
/// Leaves the calling context's data stack untouched.
///
/// # Errors
/// Returns [`CoreError::BecomeLengthMismatch`] if `old.len() != new.len()`,
/// or whatever the subsequent `gc()` call returns.
pub fn become_(
    vm: &mut Vm,
    old: &[Cell],
    new: &[Cell],
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
) -> Result<(), CoreError> {
    if old.len() != new.len() {
        return Err(CoreError::BecomeLengthMismatch);
    }

    let heap = vm.heap_mut();
    for (&old_cell, &new_cell) in old.iter().zip(new) {
        if old_cell.0 == new_cell.0 {
            continue;
        }
        let Some(old_addr) = old_cell.as_address() else {
            continue;
        };
        let new_addr = new_cell.as_address().expect("become: replacement entry must be a heap pointer");

        let (index, is_semispace) = heap.locate(old_addr).expect("become: old entry must live in the heap");
        let gen = heap.get_index_mut(index).expect("located generation index is valid");
        let zone = if is_semispace {
            gen.semispace_mut().expect("located semispace must exist")
        } else {
            gen.active_mut()
        };
        object::forward_to(zone, old_addr, new_addr);
    }

    vm.gc(object_model, code_heap)?;
    code_heap.compile_all_words();
    Ok(())
}

/// `nest_stacks`: enter a re-entrant foreign callback.
pub fn nest_stacks(vm: &mut Vm) {
    vm.nest_stacks();
}

/// `unnest_stacks`: leave a re-entrant foreign callback.
pub fn unnest_stacks(vm: &mut Vm) {
    vm.unnest_stacks();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::hooks::CodeHeap;
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
    fn datastack_round_trips_through_primitives() {
        let mut vm = Vm::new(&CoreConfig::default());
        let values = vec![Cell::immediate(1), Cell::immediate(2)];
        set_datastack(&mut vm, &values);
        assert_eq!(datastack(&vm).unwrap(), values);
    }

    #[test]
    fn become_rejects_length_mismatch() {
        let mut vm = Vm::new(&CoreConfig::default());
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;
        let old = vec![Cell::immediate(1)];
        let new = vec![Cell::immediate(1), Cell::immediate(2)];
        assert_eq!(
            become_(&mut vm, &old, &new, &model, &mut code_heap),
            Err(CoreError::BecomeLengthMismatch)
        );
    }

    #[test]
    fn become_forwards_old_object_to_new_and_survives_gc() {
        use crate::generation::GenKind;

        let mut vm = Vm::new(&CoreConfig::default());
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;

        let old_obj = vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CELL_BYTES).unwrap();
        // A spacer so `old_obj`'s forwarding-pointer word (written just past
        // its single cell) doesn't land inside `new_obj`.
        vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CELL_BYTES).unwrap();
        let new_obj = vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CELL_BYTES).unwrap();

        vm.set_user_env(0, Cell::from_address(old_obj));

        let old = vec![Cell::from_address(old_obj)];
        let new = vec![Cell::from_address(new_obj)];
        become_(&mut vm, &old, &new, &model, &mut code_heap).unwrap();

        let root_after = vm.user_env(0);
        let root_addr = root_after.as_address().expect("root is still a pointer after become+gc");
        assert!(vm.heap().get(GenKind::Tenured).unwrap().contains(root_addr));
    }

    #[test]
    fn become_leaves_the_datastack_untouched() {
        let mut vm = Vm::new(&CoreConfig::default());
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;

        let values = vec![Cell::immediate(1), Cell::immediate(2)];
        set_datastack(&mut vm, &values);

        let old = vec![Cell::immediate(5)];
        let new = vec![Cell::immediate(6)];
        become_(&mut vm, &old, &new, &model, &mut code_heap).unwrap();

        assert_eq!(datastack(&vm).unwrap(), values);
    }

    #[test]
    fn gc_primitive_runs_through_vm() {
        let mut vm = Vm::new(&CoreConfig::default());
        let model = LeafModel;
        let mut code_heap = NoCodeHeap;
        gc(&mut vm, &model, &mut code_heap).unwrap();
        assert_eq!(gc_stats(&vm).generation(crate::generation::GenKind::Tenured).collections, 1);
        clear_gc_stats(&mut vm);
        assert_eq!(gc_stats(&vm).generation(crate::generation::GenKind::Tenured).collections, 0);
    }
}
