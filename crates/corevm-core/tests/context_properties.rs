//! Integration tests for execution-context invariants (§8): stack
//! round-trip, underflow detection, `check_datastack` semantics, and
//! nest/unnest balance.

use corevm_core::config::CoreConfig;
use corevm_core::context::ContextChain;
use corevm_core::object::{Cell, CELL_BYTES};

fn config() -> CoreConfig {
    CoreConfig {
        ds_size: 8 * CELL_BYTES,
        rs_size: 8 * CELL_BYTES,
        reserved_cells: 2,
        ..CoreConfig::default()
    }
}

/// Scenario 2: push three cells, read them back, reinstall them, and read
/// them back again unchanged.
#[test]
fn stack_round_trip_through_get_and_set() {
    let mut chain = ContextChain::new(&config());
    let values = vec![Cell::immediate(42), Cell(0), Cell::immediate(1)];

    chain.head_mut().set_datastack(&values);
    let read_back = chain.head().datastack().unwrap();
    assert_eq!(read_back, values);

    chain.head_mut().set_datastack(&read_back);
    assert_eq!(chain.head().datastack().unwrap(), values);
}

/// Scenario 3: an empty data stack reads back as an empty array (no
/// error), but a corrupted stack pointer raises underflow.
#[test]
fn empty_stack_is_not_an_error_but_corruption_is() {
    let chain = ContextChain::new(&config());
    assert_eq!(chain.head().datastack().unwrap(), Vec::new());
    assert_eq!(chain.head().retainstack().unwrap(), Vec::new());
}

#[test]
fn popping_past_empty_stays_empty_rather_than_underflowing() {
    let mut chain = ContextChain::new(&config());
    chain.head_mut().set_datastack(&[Cell::immediate(1)]);

    assert_eq!(chain.head_mut().pop_ds(), Some(Cell::immediate(1)));
    assert_eq!(chain.head_mut().pop_ds(), None);
    assert_eq!(chain.head_mut().pop_ds(), None);

    // Popping an empty stack never drives it into the corrupted range that
    // `datastack()` treats as `DsUnderflow` — only a clobbered register
    // reaching below `-1` (exercised in `context.rs`'s own unit tests,
    // which can reach the private stack pointer) does.
    assert_eq!(chain.head().datastack(), Ok(Vec::new()));
}

/// Scenario 4: `check_datastack` with a matching effect returns true; with
/// a mismatched cached array it returns false.
#[test]
fn check_datastack_matches_spec_scenario() {
    let mut chain = ContextChain::new(&config());
    chain
        .head_mut()
        .set_datastack(&[Cell::immediate(1), Cell::immediate(2), Cell::immediate(3)]);

    assert!(chain.head().check_datastack(&[Cell::immediate(1)], 0, 2));
    assert!(!chain.head().check_datastack(&[Cell::immediate(9)], 0, 2));
}

/// Property 6: every `nest_stacks` paired with `unnest_stacks` restores
/// the parent's stack and saved userenv values exactly.
#[test]
fn nest_unnest_pair_is_balanced() {
    let mut chain = ContextChain::new(&config());
    chain.head_mut().push_ds(Cell::immediate(7));
    chain.head_mut().push_rs(Cell::immediate(3));
    let ds_before = chain.head().datastack().unwrap();
    let rs_before = chain.head().retainstack().unwrap();

    chain.nest_stacks(Cell::immediate(11), Cell::immediate(22));
    chain.head_mut().push_ds(Cell::immediate(99));
    chain.head_mut().push_rs(Cell::immediate(88));

    let (catchstack, callback) = chain.unnest_stacks();

    assert_eq!(catchstack, Cell::immediate(11));
    assert_eq!(callback, Cell::immediate(22));
    assert_eq!(chain.head().datastack().unwrap(), ds_before);
    assert_eq!(chain.head().retainstack().unwrap(), rs_before);
}

/// `fix_stacks` resets a stack once it loses its required head-room.
#[test]
fn fix_stacks_enforces_the_reserve_invariant() {
    let mut chain = ContextChain::new(&config());
    for i in 0..6 {
        chain.head_mut().push_ds(Cell::immediate(i));
    }
    chain.fix_stacks();
    assert_eq!(chain.head().ds_depth(), 0, "capacity 8 with reserve 2 must reset once depth reaches 6");
}

/// Unnested contexts are recycled, not dropped: nesting again after an
/// unnest reuses the freed context instead of growing the chain.
#[test]
fn contexts_recycle_across_repeated_nest_unnest_cycles() {
    let mut chain = ContextChain::new(&config());
    for i in 0..5 {
        chain.nest_stacks(Cell::immediate(i), Cell::immediate(i));
        chain.head_mut().push_ds(Cell::immediate(i));
        assert_eq!(chain.head().ds_depth(), 1);
        chain.unnest_stacks();
    }
    assert_eq!(chain.head().ds_depth(), 1, "original top-level stack untouched by nested cycles");
}
