//! Named generations and the heap that orders them young to old.

use crate::card::CardTable;
use crate::config::CoreConfig;
use crate::object::Address;
use crate::zone::Zone;

/// Identifies a generation. Declaration order is age order (`Nursery` is
/// youngest, `Tenured` oldest) so `#[derive(PartialOrd, Ord)]` gives the
/// "older than" comparisons the card-scanning and copying logic need for
/// free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GenKind {
    /// Youngest generation; always present.
    Nursery,
    /// Optional middle generation, gated by `CoreConfig::has_aging`.
    Aging,
    /// Oldest generation; always present.
    Tenured,
}

/// A single generation: either a plain zone (the nursery, which is never
/// copied into an accumulating semispace) or an `{active, semispace}` pair
/// for an accumulating generation (aging, tenured).
#[derive(Debug)]
pub struct Generation {
    kind: GenKind,
    active: Zone,
    /// `Some` for accumulating generations; rotated with `active` on each
    /// collection of this generation.
    semispace: Option<Zone>,
    /// Card table over `active`. `Some` only for generations that can
    /// hold pointers into a younger generation and thus need a write
    /// barrier (`Aging`, `Tenured`) — `Nursery` is never the "older
    /// generation `o`" side of a card scan, so it carries none.
    active_cards: Option<CardTable>,
    /// Card table over `semispace`, rotated in lockstep with it so a
    /// card table always describes the physical zone it travels with.
    semispace_cards: Option<CardTable>,
}

impl Generation {
    fn new(kind: GenKind, active: Zone, semispace: Option<Zone>, config: &CoreConfig) -> Self {
        let cards = |zone: &Zone| CardTable::new(zone.start(), zone.capacity(), config.card_bytes, config.deck_cards);
        let active_cards = (kind != GenKind::Nursery).then(|| cards(&active));
        let semispace_cards = semispace.as_ref().map(cards);
        Self {
            kind,
            active,
            semispace,
            active_cards,
            semispace_cards,
        }
    }

    /// The card table over this generation's active zone, if it keeps
    /// one.
    #[must_use]
    pub fn cards(&self) -> Option<&CardTable> {
        self.active_cards.as_ref()
    }

    /// Mutable access to the card table over this generation's active
    /// zone.
    pub fn cards_mut(&mut self) -> Option<&mut CardTable> {
        self.active_cards.as_mut()
    }

    /// Which generation this is.
    #[must_use]
    pub const fn kind(&self) -> GenKind {
        self.kind
    }

    /// The generation's currently-active zone (where the mutator/collector
    /// currently allocate survivors/new objects into, depending on phase).
    #[must_use]
    pub const fn active(&self) -> &Zone {
        &self.active
    }

    /// Mutable access to the active zone.
    pub fn active_mut(&mut self) -> &mut Zone {
        &mut self.active
    }

    /// The generation's shadow zone, if it accumulates.
    #[must_use]
    pub fn semispace(&self) -> Option<&Zone> {
        self.semispace.as_ref()
    }

    /// Mutable access to the shadow zone, if it accumulates.
    pub fn semispace_mut(&mut self) -> Option<&mut Zone> {
        self.semispace.as_mut()
    }

    /// Borrow `active` and `semispace` simultaneously. Used by the copier
    /// when an accumulating generation's own post-rotate semispace (the
    /// old occupied zone) is the copy source and its freshly-rotated
    /// active zone is the newspace, both at once.
    pub(crate) fn active_and_semispace_mut(&mut self) -> (&mut Zone, Option<&mut Zone>) {
        (&mut self.active, self.semispace.as_mut())
    }

    /// True for generations that rotate active/semispace on collection
    /// instead of being reset unconditionally (§4.1:
    /// `collecting_accumulation_gen_p`).
    #[must_use]
    pub fn is_accumulating(&self) -> bool {
        self.semispace.is_some()
    }

    /// Swap `active` and `semispace`, so the newly-active zone starts
    /// empty. Only valid on an accumulating generation. Card tables swap
    /// along with their zones so each table keeps describing the same
    /// physical address range; the newly-active zone and its card table
    /// are then cleared, since both still hold whatever they described a
    /// couple of rotations ago, back when they were last active.
    pub fn rotate(&mut self) {
        if let Some(semi) = &mut self.semispace {
            std::mem::swap(&mut self.active, semi);
        }
        if let Some(semi_cards) = &mut self.semispace_cards {
            let active_cards = self
                .active_cards
                .as_mut()
                .expect("an accumulating generation always has active cards");
            std::mem::swap(active_cards, semi_cards);
        }
        self.active.reset();
        if let Some(cards) = &mut self.active_cards {
            cards.clear();
        }
    }

    /// `here := start` on the active zone.
    pub fn reset(&mut self) {
        self.active.reset();
    }

    /// Grow both `active` and `semispace` (if present) by `extra_bytes`,
    /// growing their card tables to match. Used only for the tenured
    /// generation's heap-growth escalation.
    fn grow(&mut self, extra_bytes: usize) {
        self.active.grow(extra_bytes);
        if let Some(cards) = &mut self.active_cards {
            cards.grow(self.active.capacity());
        }
        if let Some(semi) = &mut self.semispace {
            semi.grow(extra_bytes);
            if let Some(cards) = &mut self.semispace_cards {
                cards.grow(semi.capacity());
            }
        }
    }

    /// True if `addr` falls within either of this generation's zones
    /// (active or semispace) — used by `should_copy_p`'s "anywhere in this
    /// generation" tests, which must see through an in-flight rotation.
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        self.active.contains(addr) || self.semispace.as_ref().is_some_and(|z| z.contains(addr))
    }
}

/// The ordered heap: nursery, optional aging, tenured, young to old.
#[derive(Debug)]
pub struct Heap {
    generations: Vec<Generation>,
    has_aging: bool,
}

impl Heap {
    /// Build a heap with fresh zones sized per `config`, laying zone
    /// addresses out end-to-end in a flat conceptual address space
    /// starting at zero.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        let mut next_base = 0usize;
        let mut alloc = |size: usize| -> Zone {
            let zone = Zone::new(Address(next_base), size);
            next_base += size;
            zone
        };

        let mut generations = vec![Generation::new(GenKind::Nursery, alloc(config.nursery_size), None, config)];

        if config.has_aging {
            generations.push(Generation::new(
                GenKind::Aging,
                alloc(config.aging_size),
                Some(alloc(config.aging_size)),
                config,
            ));
        }

        generations.push(Generation::new(
            GenKind::Tenured,
            alloc(config.tenured_size),
            Some(alloc(config.tenured_size)),
            config,
        ));

        Self {
            generations,
            has_aging: config.has_aging,
        }
    }

    /// Whether this heap was built with an aging generation.
    #[must_use]
    pub const fn has_aging(&self) -> bool {
        self.has_aging
    }

    /// Index of a generation kind, if present on this heap.
    #[must_use]
    pub fn index_of(&self, kind: GenKind) -> Option<usize> {
        self.generations.iter().position(|g| g.kind() == kind)
    }

    /// Borrow a generation by kind.
    #[must_use]
    pub fn get(&self, kind: GenKind) -> Option<&Generation> {
        self.index_of(kind).map(|i| &self.generations[i])
    }

    /// Mutably borrow a generation by kind.
    pub fn get_mut(&mut self, kind: GenKind) -> Option<&mut Generation> {
        self.index_of(kind).map(move |i| &mut self.generations[i])
    }

    /// Borrow by index (young to old).
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Generation> {
        self.generations.get(index)
    }

    /// Mutably borrow by index.
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut Generation> {
        self.generations.get_mut(index)
    }

    /// Number of generations on this heap (2 or 3, depending on
    /// `has_aging`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Whether this heap has no generations (never true in practice — a
    /// `Heap` is always constructed with at least nursery and tenured —
    /// kept so clippy's `len_without_is_empty` lint stays quiet).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Iterate generations older than `kind`, oldest... no, in the order
    /// they sit in the heap (young to old) restricted to those strictly
    /// older than `kind`. Card scanning (§4.2) walks each of these.
    pub fn older_than(&self, kind: GenKind) -> impl Iterator<Item = &Generation> {
        self.generations.iter().filter(move |g| g.kind() > kind)
    }

    /// Mutable version of `older_than`, for clearing card bits after a
    /// scan.
    pub fn older_than_mut(&mut self, kind: GenKind) -> impl Iterator<Item = &mut Generation> {
        self.generations.iter_mut().filter(move |g| g.kind() > kind)
    }

    /// Reset every generation in the inclusive index range
    /// `[lo_index, hi_index]`. Matches `reset_generations(lo, hi)`.
    pub fn reset_range(&mut self, lo_index: usize, hi_index: usize) {
        for gen in &mut self.generations[lo_index..=hi_index] {
            gen.reset();
        }
    }

    /// Grow the tenured generation's `active` and `semispace` zones, doubling
    /// their current capacity (or, if that still would not fit
    /// `min_extra_bytes` of headroom, growing by exactly that much).
    /// Equivalent to `grow_data_heap`: the specification's original builds
    /// an entirely new `F_DATA_HEAP` and frees the old one because its
    /// generations share one `mmap`'d region; here each zone already owns
    /// its memory independently (the same reason `alloc_segment` needed no
    /// external hook), so growing in place is the direct analogue — no
    /// separate heap object to allocate or free.
    pub(crate) fn grow_tenured(&mut self, min_extra_bytes: usize) {
        let index = self.index_of(GenKind::Tenured).expect("tenured generation always exists");
        let current = self.generations[index].active.capacity();
        let extra = current.max(min_extra_bytes);
        self.generations[index].grow(extra);
    }

    /// The write-barrier entry point: mark the card containing `slot_addr`
    /// with `bits`, if `slot_addr` falls in a generation that keeps a
    /// card table (a write into the nursery, or into a dead semispace,
    /// needs no mark). Called by the external object writer whenever it
    /// stores a pointer to a younger object into an older one.
    pub fn record_write(&mut self, slot_addr: Address, bits: u8) {
        if let Some((index, is_semispace)) = self.locate(slot_addr)
            && !is_semispace
            && let Some(cards) = self.generations[index].cards_mut()
        {
            cards.mark(slot_addr, bits);
        }
    }

    /// Find which generation, if any, contains `addr` — used by test
    /// doubles and debugging, not on the collector's hot path.
    #[must_use]
    pub fn generation_containing(&self, addr: Address) -> Option<GenKind> {
        self.generations
            .iter()
            .find(|g| g.contains(addr))
            .map(Generation::kind)
    }

    /// Locate `addr` as `(generation index, is_semispace)`, if it falls in
    /// any zone this heap owns. Used by the copier to find the zone an
    /// object currently being relocated lives in.
    #[must_use]
    pub(crate) fn locate(&self, addr: Address) -> Option<(usize, bool)> {
        for (index, gen) in self.generations.iter().enumerate() {
            if gen.active().contains(addr) {
                return Some((index, false));
            }
            if gen.semispace().is_some_and(|z| z.contains(addr)) {
                return Some((index, true));
            }
        }
        None
    }

    /// Borrow the zones at two `(generation index, is_semispace)`
    /// locations simultaneously. Panics if the two locations name the same
    /// physical zone (copying an object into itself is never valid).
    pub(crate) fn zone_pair_mut(&mut self, a: (usize, bool), b: (usize, bool)) -> (&mut Zone, &mut Zone) {
        assert!(a != b, "cannot borrow the same zone as both source and destination");

        if a.0 == b.0 {
            let (active, semi) = self.generations[a.0].active_and_semispace_mut();
            let semi = semi.expect("same-generation zone pair implies an accumulating generation");
            if a.1 {
                (semi, active)
            } else {
                (active, semi)
            }
        } else {
            let (lower, upper) = if a.0 < b.0 { (a, b) } else { (b, a) };
            let (left, right) = self.generations.split_at_mut(upper.0);
            let lower_gen = &mut left[lower.0];
            let upper_gen = &mut right[0];
            let lower_zone = if lower.1 {
                lower_gen.semispace_mut().expect("located semispace must exist")
            } else {
                lower_gen.active_mut()
            };
            let upper_zone = if upper.1 {
                upper_gen.semispace_mut().expect("located semispace must exist")
            } else {
                upper_gen.active_mut()
            };
            if a.0 < b.0 {
                (lower_zone, upper_zone)
            } else {
                (upper_zone, lower_zone)
            }
        }
    }
}
