//! The Cheney-style scan-and-copy core: `copy_handle`, `resolve_forwarding`,
//! and the `copy_reachable_objects` trace loop.

use crate::generation::{GenKind, Heap};
use crate::hooks::{CodeHeap, ObjectModel};
use crate::object::{self, Address, Cell};
use crate::zone::{NewspaceFull, Zone};

/// Which generation is being collected. Each variant carries its own
/// `should_copy` test inline rather than going through a trait object —
/// this is the one predicate evaluated per traced cell, so it stays a
/// direct match rather than a dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectingGen {
    Nursery,
    Aging,
    Tenured,
}

impl CollectingGen {
    #[must_use]
    pub const fn kind(self) -> GenKind {
        match self {
            Self::Nursery => GenKind::Nursery,
            Self::Aging => GenKind::Aging,
            Self::Tenured => GenKind::Tenured,
        }
    }

    /// Whether a pointer at `addr` is in scope to be copied into
    /// `newspace`, given which generation is being collected.
    #[must_use]
    fn should_copy(self, heap: &Heap, newspace: &Zone, addr: Address) -> bool {
        match self {
            Self::Nursery => heap.get(GenKind::Nursery).is_some_and(|g| g.active().contains(addr)),
            Self::Aging => {
                !newspace.contains(addr) && !heap.get(GenKind::Tenured).is_some_and(|g| g.contains(addr))
            }
            Self::Tenured => !newspace.contains(addr),
        }
    }
}

fn zone_at(heap: &Heap, loc: (usize, bool)) -> &Zone {
    let gen = heap.get_index(loc.0).expect("location must name a live generation");
    if loc.1 {
        gen.semispace().expect("location marked semispace but generation has none")
    } else {
        gen.active()
    }
}

/// Chase a chain of forwarding pointers to its ultimate, non-forwarded
/// target. Idempotent: calling this twice on the same address returns the
/// same result as calling it once, since the second call finds no
/// forwarding bit set on the already-resolved target.
#[must_use]
pub fn resolve_forwarding(heap: &Heap, addr: Address) -> Address {
    let mut current = addr;
    loop {
        let loc = heap.locate(current).expect("address must live in a known zone");
        let zone = zone_at(heap, loc);
        if object::is_forwarded(zone, current) {
            current = object::forwarding_target(zone, current);
        } else {
            return current;
        }
    }
}

/// Relocate the object at `addr` into the `newspace_kind` generation's
/// active zone: bump-allocate room, copy the body, and leave a forwarding
/// pointer behind in the original. Returns the new address and the number
/// of bytes copied.
fn copy_object_impl(
    heap: &mut Heap,
    newspace_kind: GenKind,
    addr: Address,
    object_model: &dyn ObjectModel,
) -> Result<(Address, usize), NewspaceFull> {
    let source_loc = heap.locate(addr).expect("object being copied must live in a known zone");
    let size = object_model.untagged_object_size(zone_at(heap, source_loc), addr);

    let newspace_index = heap
        .index_of(newspace_kind)
        .expect("newspace generation must exist on this heap");
    let (src, dst) = heap.zone_pair_mut(source_loc, (newspace_index, false));

    let new_addr = dst.allot(size)?;
    let body = src.read_bytes(addr, size);
    dst.write_bytes(new_addr, &body);
    object::forward_to(src, addr, new_addr);

    Ok((new_addr, size))
}

/// `copy_handle(*h)`: no-op on an immediate, otherwise chase any existing
/// forwarding, decide `should_copy`, and relocate if so. Returns the
/// (possibly unchanged) cell to write back into the slot that held it,
/// plus how many bytes were freshly copied (zero if nothing moved).
pub fn copy_handle(
    heap: &mut Heap,
    collecting: CollectingGen,
    newspace_kind: GenKind,
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
    cell: Cell,
) -> Result<(Cell, usize), NewspaceFull> {
    let Some(original_addr) = cell.as_address() else {
        return Ok((cell, 0));
    };

    let addr = resolve_forwarding(heap, original_addr);

    let newspace_index = heap
        .index_of(newspace_kind)
        .expect("newspace generation must exist on this heap");
    let in_scope = {
        let newspace = heap.get_index(newspace_index).expect("newspace index is valid").active();
        collecting.should_copy(heap, newspace, addr)
    };

    if !in_scope {
        return Ok((Cell::from_address(addr), 0));
    }

    let (new_addr, bytes) = copy_object_impl(heap, newspace_kind, addr, object_model)?;

    if matches!(collecting, CollectingGen::Tenured) {
        code_heap.mark_object_code_block(new_addr);
    }

    Ok((Cell::from_address(new_addr), bytes))
}

/// Aggregate counters produced by one Cheney pass, folded into
/// `collector::GenerationStats` by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    pub object_count: usize,
    pub bytes_copied: usize,
}

/// The Cheney loop: walk newspace from `scan_start` to its (growing)
/// `here`, treating newspace itself as the work queue. For each object,
/// trace its pointer cells through `copy_handle`, which may append more
/// objects to newspace and thereby extend the loop's own upper bound.
pub fn copy_reachable_objects(
    heap: &mut Heap,
    collecting: CollectingGen,
    newspace_kind: GenKind,
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
    scan_start: Address,
) -> Result<TraceStats, NewspaceFull> {
    let newspace_index = heap
        .index_of(newspace_kind)
        .expect("newspace generation must exist on this heap");

    let mut scan = scan_start;
    let mut stats = TraceStats::default();

    loop {
        let here = heap.get_index(newspace_index).expect("newspace index is valid").active().here();
        if scan >= here {
            break;
        }

        let (size, payload_start, offsets) = {
            let zone = heap.get_index(newspace_index).expect("newspace index is valid").active();
            (
                object_model.untagged_object_size(zone, scan),
                object_model.binary_payload_start(zone, scan),
                object_model.trace(zone, scan),
            )
        };

        for offset in offsets {
            if offset >= payload_start {
                continue;
            }
            let cell_addr = scan.offset(offset);
            let raw = heap
                .get_index(newspace_index)
                .expect("newspace index is valid")
                .active()
                .read_word(cell_addr);
            let (updated, bytes) = copy_handle(heap, collecting, newspace_kind, object_model, code_heap, Cell(raw))?;
            stats.bytes_copied += bytes;
            if updated.0 != raw {
                heap.get_index_mut(newspace_index)
                    .expect("newspace index is valid")
                    .active_mut()
                    .write_word(cell_addr, updated.0);
            }
        }

        stats.object_count += 1;
        scan = scan.offset(size);
    }

    Ok(stats)
}
