//! Integration tests for the collector's invariants (§8): reachability
//! preservation, forwarding idempotence, card correctness, stats
//! monotonicity, and the literal scenarios the specification spells out.

use corevm_core::config::CoreConfig;
use corevm_core::context::ContextChain;
use corevm_core::generation::GenKind;
use corevm_core::hooks::{CodeHeap, ObjectModel};
use corevm_core::object::{Address, Cell, CELL_BYTES};
use corevm_core::primitives;
use corevm_core::roots::{BignumRoots, LocalRoots, RootSet};
use corevm_core::vm::Vm;
use corevm_core::zone::Zone;

/// A two-cell cons object: `car` traced, `cdr` traced, no binary payload.
struct ConsModel;

const CONS_BYTES: usize = 2 * CELL_BYTES;

impl ObjectModel for ConsModel {
    fn untagged_object_size(&self, _zone: &Zone, _addr: Address) -> usize {
        CONS_BYTES
    }
    fn binary_payload_start(&self, _zone: &Zone, _addr: Address) -> usize {
        CONS_BYTES
    }
    fn trace(&self, _zone: &Zone, _addr: Address) -> Vec<usize> {
        vec![0, CELL_BYTES]
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

fn small_config() -> CoreConfig {
    CoreConfig {
        nursery_size: 512,
        aging_size: 1024,
        tenured_size: 4096,
        has_aging: true,
        ds_size: 8 * CELL_BYTES,
        rs_size: 8 * CELL_BYTES,
        ..CoreConfig::default()
    }
}

/// Scenario 1: empty nursery collection touches nothing.
#[test]
fn empty_nursery_collection_leaves_bytes_copied_zero() {
    let mut vm = Vm::new(&small_config());
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    primitives::minor_gc(&mut vm, &model, &mut code_heap).unwrap();

    let stats = primitives::gc_stats(&vm);
    assert_eq!(stats.generation(GenKind::Nursery).collections, 1);
    assert_eq!(stats.generation(GenKind::Nursery).bytes_copied, 0);
}

/// Property 1 (reachability preservation) + scenario 5 (promotion): a
/// chain of cons cells rooted in a constant survives a full GC and ends up
/// out of the nursery.
#[test]
fn reachable_chain_survives_full_gc_and_leaves_nursery() {
    let mut heap_config = small_config();
    heap_config.nursery_size = 256;
    let mut vm = Vm::new(&heap_config);
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    let mut tail = Cell::immediate(0);
    for _ in 0..3 {
        let obj = vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CONS_BYTES).unwrap();
        vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj, 0);
        vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj.offset(CELL_BYTES), tail.0);
        tail = Cell::from_address(obj);
    }

    vm.set_user_env(0, tail);

    primitives::gc(&mut vm, &model, &mut code_heap).unwrap();

    let root_after = vm.user_env(0);
    let root_addr = root_after.as_address().expect("root is still a pointer, not reclaimed");
    assert!(vm.heap().get(GenKind::Tenured).unwrap().contains(root_addr));

    let nursery = vm.heap().get(GenKind::Nursery).unwrap().active();
    assert_eq!(nursery.here(), nursery.start(), "a full gc must empty the nursery it subsumed");
}

/// Property 3: `resolve_forwarding` applied twice agrees with once.
#[test]
fn forwarding_is_idempotent_across_a_collection() {
    let mut vm = Vm::new(&small_config());
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    let obj = vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CONS_BYTES).unwrap();
    vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj, 0);
    vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj.offset(CELL_BYTES), 0);
    vm.set_user_env(0, Cell::from_address(obj));

    primitives::minor_gc(&mut vm, &model, &mut code_heap).unwrap();

    let once = corevm_core::copier::resolve_forwarding(vm.heap(), obj);
    let twice = corevm_core::copier::resolve_forwarding(vm.heap(), once);
    assert_eq!(once, twice);
}

/// Property 4: a write from an older generation into the nursery marks
/// the card that holds the slot.
#[test]
fn write_barrier_marks_the_card_holding_the_cross_generational_pointer() {
    let mut vm = Vm::new(&small_config());

    let tenured_obj = vm.heap_mut().get_mut(GenKind::Tenured).unwrap().active_mut().allot(CONS_BYTES).unwrap();
    let nursery_obj = vm.heap_mut().get_mut(GenKind::Nursery).unwrap().active_mut().allot(CONS_BYTES).unwrap();

    vm.heap_mut().get_mut(GenKind::Tenured).unwrap().active_mut().write_word(tenured_obj, nursery_obj.0);
    vm.heap_mut().record_write(tenured_obj, corevm_core::card::POINTS_TO_NURSERY);

    let mut hits = 0;
    vm.heap_mut().get_mut(GenKind::Tenured).unwrap().cards_mut().unwrap().scan(
        Address(usize::MAX),
        corevm_core::card::POINTS_TO_NURSERY,
        0,
        |_, _| hits += 1,
    );
    assert_eq!(hits, 1);
}

/// Property 7: stats counters never decrease between `clear_gc_stats`
/// calls, across a sequence of collections.
#[test]
fn stats_are_monotonic_between_clears() {
    let mut vm = Vm::new(&small_config());
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    let mut previous = 0u64;
    for _ in 0..3 {
        primitives::minor_gc(&mut vm, &model, &mut code_heap).unwrap();
        let collections = primitives::gc_stats(&vm).generation(GenKind::Nursery).collections;
        assert!(collections >= previous);
        previous = collections;
    }

    primitives::clear_gc_stats(&mut vm);
    assert_eq!(primitives::gc_stats(&vm).generation(GenKind::Nursery).collections, 0);
}

/// Disabling GC surfaces as an error rather than silently skipping.
#[test]
fn disabled_gc_is_rejected_not_silently_skipped() {
    let mut vm = Vm::new(&small_config());
    primitives::set_gc_enabled(&mut vm, false);
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    let result = primitives::gc(&mut vm, &model, &mut code_heap);
    assert!(result.is_err());
}

/// A manually constructed root set (independent of `Vm`) exercises
/// `copy_roots`'s fixed scan order without going through the VM wrapper.
#[test]
fn constants_locals_and_contexts_all_participate_in_root_scanning() {
    let config = small_config();
    let mut heap = corevm_core::generation::Heap::new(&config);
    let mut contexts = ContextChain::new(&config);
    let mut constants = vec![Cell(0); 2];
    let mut locals = LocalRoots::new();
    let mut bignums = BignumRoots::new();
    let mut user_env = vec![Cell(0); 2];
    let model = ConsModel;
    let mut code_heap = NoCodeHeap;

    let obj = heap.get_mut(GenKind::Nursery).unwrap().active_mut().allot(CONS_BYTES).unwrap();
    heap.get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj, 0);
    heap.get_mut(GenKind::Nursery).unwrap().active_mut().write_word(obj.offset(CELL_BYTES), 0);
    constants[0] = Cell::from_address(obj);

    let mut roots = RootSet {
        constants: &mut constants,
        locals: &mut locals,
        bignums: &mut bignums,
        contexts: &mut contexts,
        user_env: &mut user_env,
    };

    let stats = corevm_core::roots::copy_roots(
        &mut heap,
        corevm_core::copier::CollectingGen::Nursery,
        GenKind::Tenured,
        &model,
        &mut code_heap,
        &mut roots,
    )
    .unwrap();

    assert_eq!(stats.object_count, 1);
    assert!(heap.get(GenKind::Tenured).unwrap().contains(constants[0].as_address().unwrap()));
}
