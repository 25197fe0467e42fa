//! Zones: contiguous, bump-allocated memory segments.
//!
//! A zone owns its backing bytes as a `Vec<u8>` rather than a raw pointer
//! into a `malloc`'d region (the shape the teacher's
//! `otterc_runtime::memory::gc::OldGeneration` already uses: a `Vec<u8>`
//! plus a `free` offset). Each zone claims a disjoint slice of a flat,
//! conceptual address space via its `base`; addresses are just byte
//! offsets into that space, and a zone's membership test is a cheap range
//! comparison against `base`/`end` rather than raw pointer arithmetic.

use crate::object::{Address, CELL_BYTES};

/// Bump-allocation failed because newspace could not fit the requested
/// size. The collector driver catches this and escalates (see
/// `collector::Collector::collect`); it never reaches a hosted-language
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewspaceFull;

/// A contiguous memory segment with `start <= here <= end`, matching the
/// specification's zone invariant exactly.
#[derive(Debug)]
pub struct Zone {
    base: Address,
    memory: Vec<u8>,
    here: usize,
}

impl Zone {
    /// Allocate a fresh zone of `size` bytes starting at `base`. Matches
    /// `alloc_segment(size)` in the specification.
    #[must_use]
    pub fn new(base: Address, size: usize) -> Self {
        Self {
            base,
            memory: vec![0u8; size],
            here: 0,
        }
    }

    /// The zone's start address (`here`'s floor).
    #[must_use]
    pub const fn start(&self) -> Address {
        self.base
    }

    /// The current bump pointer, as an absolute address.
    #[must_use]
    pub fn here(&self) -> Address {
        self.base.offset(self.here)
    }

    /// The zone's end address (`here`'s ceiling).
    #[must_use]
    pub fn end(&self) -> Address {
        self.base.offset(self.memory.len())
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Bytes bump-allocated so far.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.here
    }

    /// True if `addr` falls anywhere within this zone's reserved range,
    /// whether or not that byte has been allocated yet. This matches the
    /// specification's `in_zone` test, which is a membership test against
    /// the whole reserved segment, not just the allocated prefix.
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Reset `here` back to `start`, matching `reset_generation`.
    pub fn reset(&mut self) {
        self.here = 0;
    }

    /// Extend this zone's capacity by `extra_bytes`, in place. `base` and
    /// `here` are untouched; only the reserved-but-unallocated tail grows.
    /// Used by heap-growth escalation (`Heap::grow_tenured`) — since a zone
    /// owns its memory as a `Vec<u8>` rather than a fixed `mmap`'d region,
    /// growing it is a resize rather than a replace-the-whole-heap
    /// operation.
    pub(crate) fn grow(&mut self, extra_bytes: usize) {
        self.memory.resize(self.memory.len() + extra_bytes, 0);
    }

    /// Bump-allocate `size` bytes, returning the address of the first
    /// byte, or `NewspaceFull` if the zone cannot fit the request. An
    /// allocation landing exactly on the zone's end is rejected, not just
    /// one that would overrun it (`here + size >= end`, matching
    /// `copy_untagged_object_impl`'s `longjmp` guard).
    pub fn allot(&mut self, size: usize) -> Result<Address, NewspaceFull> {
        if self.here + size >= self.memory.len() {
            return Err(NewspaceFull);
        }
        let addr = self.base.offset(self.here);
        self.here += size;
        Ok(addr)
    }

    fn local_offset(&self, addr: Address) -> usize {
        debug_assert!(
            addr >= self.base && addr <= self.end(),
            "address out of zone range"
        );
        addr.0 - self.base.0
    }

    /// Read a machine word at `addr` (native endianness; this is an
    /// in-process heap, never persisted or sent across a wire).
    #[must_use]
    pub fn read_word(&self, addr: Address) -> usize {
        let offset = self.local_offset(addr);
        let bytes: [u8; CELL_BYTES] = self.memory[offset..offset + CELL_BYTES]
            .try_into()
            .expect("slice has exactly CELL_BYTES bytes");
        usize::from_ne_bytes(bytes)
    }

    /// Write a machine word at `addr`.
    pub fn write_word(&mut self, addr: Address, value: usize) {
        let offset = self.local_offset(addr);
        self.memory[offset..offset + CELL_BYTES].copy_from_slice(&value.to_ne_bytes());
    }

    /// Copy `len` bytes starting at `addr` out of this zone (used by the
    /// copier's `memcpy` step when relocating an object's body).
    #[must_use]
    pub fn read_bytes(&self, addr: Address, len: usize) -> Vec<u8> {
        let offset = self.local_offset(addr);
        self.memory[offset..offset + len].to_vec()
    }

    /// Overwrite `bytes.len()` bytes starting at `addr`.
    pub fn write_bytes(&mut self, addr: Address, bytes: &[u8]) {
        let offset = self.local_offset(addr);
        self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation_respects_capacity() {
        let mut zone = Zone::new(Address(0), 16);
        assert_eq!(zone.allot(8), Ok(Address(0)));
        assert_eq!(zone.allot(7), Ok(Address(8)));
        // here == 15; one more byte would land exactly on end (16 >= 16).
        assert_eq!(zone.allot(1), Err(NewspaceFull));
    }

    #[test]
    fn allotting_exactly_to_the_end_is_rejected() {
        let mut zone = Zone::new(Address(0), 16);
        assert_eq!(zone.allot(16), Err(NewspaceFull));
    }

    #[test]
    fn reset_reclaims_whole_zone() {
        let mut zone = Zone::new(Address(0), 16);
        zone.allot(15).unwrap();
        assert_eq!(zone.here(), Address(15));
        zone.reset();
        assert_eq!(zone.here(), zone.start());
    }

    #[test]
    fn contains_covers_whole_reserved_range_not_just_used_prefix() {
        let zone = Zone::new(Address(100), 16);
        assert!(zone.contains(Address(100)));
        assert!(zone.contains(Address(115)));
        assert!(!zone.contains(Address(116)));
        assert!(!zone.contains(Address(99)));
    }

    #[test]
    fn word_round_trip() {
        let mut zone = Zone::new(Address(0), 32);
        zone.write_word(Address(8), 0xABCD);
        assert_eq!(zone.read_word(Address(8)), 0xABCD);
    }
}
