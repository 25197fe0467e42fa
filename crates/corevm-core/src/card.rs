//! Card and deck tables: the write-barrier's remembered-set metadata.
//!
//! A `CardTable` covers one generation's *active* zone with one mark byte
//! per `card_bytes` heap bytes. A `DeckTable` covers the card table with
//! one summary byte per `deck_cards` cards, OR-ing together every bit set
//! in the cards it covers, so a mostly-clean heap can be scanned in
//! `O(heap / deck_size)` time instead of `O(heap / card_size)`.

use crate::object::Address;

/// A tenured or aging object holds a pointer into the nursery.
pub const POINTS_TO_NURSERY: u8 = 0b01;
/// A tenured object holds a pointer into the aging generation.
pub const POINTS_TO_AGING: u8 = 0b10;
/// Both mark bits.
pub const ALL_MARKS: u8 = POINTS_TO_NURSERY | POINTS_TO_AGING;

/// Per-generation card and deck marks.
#[derive(Debug)]
pub struct CardTable {
    card_bytes: usize,
    deck_cards: usize,
    base: Address,
    cards: Vec<u8>,
    decks: Vec<u8>,
}

impl CardTable {
    /// Build a card table covering `zone_size` bytes of a zone starting at
    /// `base`, with the given card/deck geometry.
    #[must_use]
    pub fn new(base: Address, zone_size: usize, card_bytes: usize, deck_cards: usize) -> Self {
        let card_count = zone_size.div_ceil(card_bytes);
        let deck_count = card_count.div_ceil(deck_cards);
        Self {
            card_bytes,
            deck_cards,
            base,
            cards: vec![0u8; card_count],
            decks: vec![0u8; deck_count],
        }
    }

    /// Extend this table to cover a zone that has grown to `new_zone_size`
    /// bytes, appending clean cards/decks for the new tail. Existing marks
    /// are left untouched.
    pub(crate) fn grow(&mut self, new_zone_size: usize) {
        let card_count = new_zone_size.div_ceil(self.card_bytes);
        let deck_count = card_count.div_ceil(self.deck_cards);
        self.cards.resize(card_count, 0);
        self.decks.resize(deck_count, 0);
    }

    fn card_index(&self, addr: Address) -> usize {
        (addr.0 - self.base.0) / self.card_bytes
    }

    fn deck_index(&self, card_index: usize) -> usize {
        card_index / self.deck_cards
    }

    /// The address range a card covers, as `[start, end)`.
    fn card_range(&self, card_index: usize) -> (Address, Address) {
        let start = self.base.offset(card_index * self.card_bytes);
        (start, start.offset(self.card_bytes))
    }

    /// The write-barrier entry point: mark `bits` on the card containing
    /// `addr`, and OR them into the covering deck.
    pub fn mark(&mut self, addr: Address, bits: u8) {
        let card = self.card_index(addr);
        self.cards[card] |= bits;
        let deck = self.deck_index(card);
        self.decks[deck] |= bits;
    }

    /// Zero every card and deck mark. Called when a generation rotates
    /// and this table's zone becomes the new active zone: its marks
    /// describe the zone's occupant from several rotations ago and must
    /// not leak into the fresh generation.
    pub fn clear(&mut self) {
        self.cards.fill(0);
        self.decks.fill(0);
    }

    /// Clear `unmask` bits from a card (and recompute its deck's summary
    /// from scratch, since deck bits are a pure OR of their cards).
    fn clear_card(&mut self, card_index: usize, unmask: u8) {
        self.cards[card_index] &= !unmask;
        let deck = self.deck_index(card_index);
        let deck_start = deck * self.deck_cards;
        let deck_end = (deck_start + self.deck_cards).min(self.cards.len());
        let mut summary = 0u8;
        for &c in &self.cards[deck_start..deck_end] {
            summary |= c;
        }
        self.decks[deck] = summary;
    }

    /// Visit every card whose mark byte has any bit in `mask` set, in
    /// address order, skipping whole decks that have none of `mask` set
    /// (the deck-level prefilter from the specification's §4.2). After a
    /// card is visited, `unmask` is cleared from it.
    ///
    /// `visit` receives the `[card_start, card_end)` address range to
    /// scan; `here` bounds the scan to the portion of the zone that was
    /// actually live at the time this scan started (a card at the tail of
    /// the zone may be only partially allocated).
    ///
    /// Returns how many decks and cards this call examined, folded by the
    /// caller into the process-global `cards_scanned`/`decks_scanned`
    /// counters.
    pub fn scan<F: FnMut(Address, Address)>(&mut self, here: Address, mask: u8, unmask: u8, mut visit: F) -> ScanStats {
        let mut stats = ScanStats::default();
        let deck_count = self.decks.len();
        for deck in 0..deck_count {
            stats.decks_scanned += 1;
            if self.decks[deck] & mask == 0 {
                continue;
            }
            let deck_start = deck * self.deck_cards;
            let deck_end = (deck_start + self.deck_cards).min(self.cards.len());
            for card in deck_start..deck_end {
                stats.cards_scanned += 1;
                if self.cards[card] & mask == 0 {
                    continue;
                }
                let (start, mut end) = self.card_range(card);
                if end > here {
                    end = here;
                }
                if start < end {
                    visit(start, end);
                }
                self.clear_card(card, unmask);
            }
        }
        stats
    }
}

/// How many decks and cards one `CardTable::scan` call examined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub decks_scanned: usize,
    pub cards_scanned: usize,
}
