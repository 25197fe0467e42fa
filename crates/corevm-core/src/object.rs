//! Cell/Address representation and the object header's forwarding bit.
//!
//! The object representation proper (tag bits beyond "pointer or
//! immediate", type tags, field layout) belongs to the external object
//! system — this module only implements the slice of the data model the
//! collector itself must understand: a tagged machine word, a heap
//! address, and the one bit of header state the copier owns.

use crate::zone::Zone;

/// Size in bytes of one machine word / cell. The core only ever runs on
/// platforms where `usize` is the native word size, so this is just
/// `size_of::<usize>()` given a name that matches the specification's
/// vocabulary.
pub const CELL_BYTES: usize = size_of::<usize>();

/// A simulated heap address: a byte offset into the flat, conceptually
/// contiguous address space the `Heap` hands out to its zones. See
/// `zone::Zone` for how a zone's `base` claims a slice of this space.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub usize);

impl Address {
    /// Offset this address by `delta` bytes.
    #[must_use]
    pub const fn offset(self, delta: usize) -> Self {
        Self(self.0 + delta)
    }
}

/// A machine-word tagged value: either a pointer into the object heap, or
/// an immediate whose payload the core never interprets.
///
/// Bit 0 is the tag: clear means "pointer", set means "immediate". Every
/// heap address handed out by `Zone::allot` is word-aligned, so the low
/// bit of a real address is always clear and this scheme never collides
/// with a genuine pointer.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell(pub usize);

const IMMEDIATE_TAG: usize = 1;

impl Cell {
    /// Wrap a heap address as a pointer cell.
    #[must_use]
    pub const fn from_address(addr: Address) -> Self {
        Self(addr.0)
    }

    /// Build an immediate cell carrying an opaque payload in its high bits.
    #[must_use]
    pub const fn immediate(payload: usize) -> Self {
        Self((payload << 1) | IMMEDIATE_TAG)
    }

    /// True if this cell is tagged as an immediate (not traced by the GC).
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        self.0 & IMMEDIATE_TAG != 0
    }

    /// View this cell as a heap address, if it isn't an immediate.
    #[must_use]
    pub const fn as_address(self) -> Option<Address> {
        if self.is_immediate() {
            None
        } else {
            Some(Address(self.0))
        }
    }
}

/// Low bit of the header word: set while the object's body has been
/// relocated by the copier. Documented here per the specification's
/// requirement that implementations state which bit they use and
/// guarantee it is otherwise always clear on a live header.
pub const FORWARDING_BIT: usize = 1;

/// Read an object's header word and report whether the forwarding bit is
/// set.
pub fn is_forwarded(zone: &Zone, object_addr: Address) -> bool {
    zone.read_word(object_addr) & FORWARDING_BIT != 0
}

/// Read the forwarding target out of an object's first body word. Only
/// valid to call when `is_forwarded` is true; the first body word has no
/// other meaning once the header has been marked forwarded.
pub fn forwarding_target(zone: &Zone, object_addr: Address) -> Address {
    Address(zone.read_word(object_addr.offset(CELL_BYTES)))
}

/// Mark `object_addr`'s header as forwarded to `new_addr`, stealing the
/// object's first body word to hold the new address (so no extra header
/// space is needed to represent a forwarding pointer).
pub fn forward_to(zone: &mut Zone, object_addr: Address, new_addr: Address) {
    let header = zone.read_word(object_addr);
    zone.write_word(object_addr, header | FORWARDING_BIT);
    zone.write_word(object_addr.offset(CELL_BYTES), new_addr.0);
}
