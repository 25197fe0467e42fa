//! The collector driver: `garbage_collection`, its `begin_gc`/`end_gc`
//! halves, and the overflow-escalation retry loop.
//!
//! Grounded in the teacher's `memory::gc::Collector::collect`, which
//! drives the same pick-newspace / scan-roots / scan-cards / trace /
//! sweep-code-heap sequence over its own two-generation heap; this module
//! generalizes that sequence to the three-generation nursery/aging/tenured
//! layout and the mask/unmask card table described in the specification.

use crate::card::{ALL_MARKS, POINTS_TO_AGING, POINTS_TO_NURSERY};
use crate::copier::{self, CollectingGen};
use crate::error::CoreError;
use crate::generation::{GenKind, Heap};
use crate::hooks::{Clock, CodeHeap, ObjectModel};
use crate::roots::{copy_roots, RootSet};
use crate::zone::NewspaceFull;

/// Per-generation counters, mirroring the specification's §3 packed stats
/// array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub collections: u64,
    pub gc_time_micros: u64,
    pub max_gc_time_micros: u64,
    pub object_count: u64,
    pub bytes_copied: u64,
}

impl GenerationStats {
    fn record(&mut self, object_count: u64, bytes_copied: u64, elapsed_micros: u64) {
        self.collections += 1;
        self.object_count += object_count;
        self.bytes_copied += bytes_copied;
        self.gc_time_micros += elapsed_micros;
        self.max_gc_time_micros = self.max_gc_time_micros.max(elapsed_micros);
    }
}

/// The full stats surface `gc_stats`/`clear_gc_stats` expose: three
/// per-generation blocks plus the process-global card-scanning counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    nursery: GenerationStats,
    aging: GenerationStats,
    tenured: GenerationStats,
    pub cards_scanned: u64,
    pub decks_scanned: u64,
    pub card_scan_time_micros: u64,
    pub code_heap_scans: u64,
}

impl GcStats {
    /// Per-generation counters for `kind`.
    #[must_use]
    pub const fn generation(&self, kind: GenKind) -> &GenerationStats {
        match kind {
            GenKind::Nursery => &self.nursery,
            GenKind::Aging => &self.aging,
            GenKind::Tenured => &self.tenured,
        }
    }

    fn generation_mut(&mut self, kind: GenKind) -> &mut GenerationStats {
        match kind {
            GenKind::Nursery => &mut self.nursery,
            GenKind::Aging => &mut self.aging,
            GenKind::Tenured => &mut self.tenured,
        }
    }

    /// `clear_gc_stats`: zero every counter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// `garbage_collection`'s driver state, held across the escalation retry
/// loop so `last_code_heap_scan` survives a restart the way the
/// specification requires.
#[derive(Debug)]
pub struct Collector {
    enabled: bool,
    last_code_heap_scan: Option<GenKind>,
    /// Set mid-escalation when an aging collection has already retried
    /// once as a second pass (§4.2's "AGING (second pass)" row) and must
    /// not retry a third time before falling through to tenured.
    collecting_aging_again: bool,
    /// Set once a tenured overflow has triggered a heap-growth retry, so a
    /// second overflow on the very same attempt surfaces as
    /// [`CoreError::BadGeneration`] instead of growing forever.
    growing: bool,
    stats: GcStats,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            enabled: true,
            last_code_heap_scan: None,
            collecting_aging_again: false,
            growing: false,
            stats: GcStats::default(),
        }
    }
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// `garbage_collection(gen, growing, ...)`: the public entry point.
    /// Escalates generation-by-generation on `NewspaceFull`, per §4.5;
    /// overflowing `Tenured` itself grows the tenured generation in place
    /// and retries once (`escalate`/`begin_gc`'s `growing` handling) before
    /// giving up with [`CoreError::BadGeneration`].
    #[allow(clippy::too_many_arguments)]
    pub fn garbage_collection(
        &mut self,
        heap: &mut Heap,
        roots: &mut RootSet<'_>,
        object_model: &dyn ObjectModel,
        code_heap: &mut dyn CodeHeap,
        clock: &dyn Clock,
        gen: GenKind,
    ) -> Result<(), CoreError> {
        if !self.enabled {
            return Err(CoreError::GcDisabled);
        }
        if gen == GenKind::Aging && !heap.has_aging() {
            return Err(CoreError::BadGeneration);
        }

        let start_micros = clock.current_micros();
        let mut collecting = gen;
        self.growing = false;

        loop {
            match self.begin_gc(heap, roots, object_model, code_heap, clock, collecting) {
                Ok(trace) => {
                    let elapsed = clock.current_micros().saturating_sub(start_micros);
                    self.end_gc(heap, trace, elapsed);
                    return Ok(());
                }
                Err(NewspaceFull) => {
                    collecting = self.escalate(heap, collecting)?;
                }
            }
        }
    }

    /// `gc`: synchronous full collection (§4.7).
    pub fn gc(
        &mut self,
        heap: &mut Heap,
        roots: &mut RootSet<'_>,
        object_model: &dyn ObjectModel,
        code_heap: &mut dyn CodeHeap,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        self.garbage_collection(heap, roots, object_model, code_heap, clock, GenKind::Tenured)
    }

    /// `minor_gc`: nursery-only collection (§4.7).
    pub fn minor_gc(
        &mut self,
        heap: &mut Heap,
        roots: &mut RootSet<'_>,
        object_model: &dyn ObjectModel,
        code_heap: &mut dyn CodeHeap,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        self.garbage_collection(heap, roots, object_model, code_heap, clock, GenKind::Nursery)
    }

    /// Decide how to retry after `NewspaceFull`, per the escalation table
    /// in §4.5: tenured overflow sets `growing` and re-requests the same
    /// generation, unless a growth retry has already been spent this
    /// attempt, in which case escalation has nowhere left to go; aging
    /// overflow retries once as a second pass before falling through;
    /// anything younger escalates to the next-older generation.
    fn escalate(&mut self, heap: &Heap, collecting: GenKind) -> Result<GenKind, CoreError> {
        match collecting {
            GenKind::Tenured if !self.growing => {
                self.growing = true;
                Ok(GenKind::Tenured)
            }
            GenKind::Tenured => Err(CoreError::BadGeneration),
            GenKind::Aging if heap.has_aging() && !self.collecting_aging_again => {
                self.collecting_aging_again = true;
                Ok(GenKind::Aging)
            }
            GenKind::Nursery => Ok(if heap.has_aging() { GenKind::Aging } else { GenKind::Tenured }),
            GenKind::Aging => Ok(GenKind::Tenured),
        }
    }

    /// `begin_gc` + `copy_roots` + `copy_cards` + `copy_reachable_objects`
    /// + code-heap roots, all as one attempt that either succeeds or
    /// returns `NewspaceFull` for the caller to escalate. Card bits
    /// cleared mid-scan are not rolled back on failure — consistent with
    /// the specification's note that a retry always restarts from a fresh
    /// `begin_gc` and relies on `resolve_forwarding` to tolerate any
    /// already-forwarded pointers left behind by the abandoned attempt.
    #[allow(clippy::too_many_arguments)]
    fn begin_gc(
        &mut self,
        heap: &mut Heap,
        roots: &mut RootSet<'_>,
        object_model: &dyn ObjectModel,
        code_heap: &mut dyn CodeHeap,
        clock: &dyn Clock,
        collecting: GenKind,
    ) -> Result<TraceResult, NewspaceFull> {
        let newspace_kind = if self.growing {
            // `collecting == Tenured` always holds here: `escalate` only
            // ever sets `growing` from the `Tenured` arm. Grow the zone
            // already rotated into place by the attempt that just
            // overflowed, and restart the copy into it from scratch —
            // any cells it bump-allocated before failing are abandoned,
            // same as any other failed attempt (see this function's doc
            // comment).
            heap.grow_tenured(0);
            heap.get_mut(GenKind::Tenured).expect("tenured generation always exists").reset();
            code_heap.unmark_marked();
            GenKind::Tenured
        } else if heap.get(collecting).is_some_and(|g| g.is_accumulating()) {
            heap.get_mut(collecting).expect("checked above").rotate();
            collecting
        } else {
            next_older(heap, collecting)
        };

        let scan_start = heap
            .get(newspace_kind)
            .expect("newspace generation exists")
            .active()
            .here();

        let collecting_gen = as_collecting_gen(collecting);

        let root_stats = copy_roots(heap, collecting_gen, newspace_kind, object_model, code_heap, roots)?;

        let card_scan_start = clock.current_micros();
        let card_stats = self.copy_cards(heap, collecting_gen, collecting, newspace_kind, object_model, code_heap)?;
        let card_scan_time_micros = clock.current_micros().saturating_sub(card_scan_start);

        let trace_stats =
            copier::copy_reachable_objects(heap, collecting_gen, newspace_kind, object_model, code_heap, scan_start)?;

        let code_heap_scanned = self.scan_code_heap_roots(heap, code_heap, collecting);

        Ok(TraceResult {
            collecting,
            newspace_kind,
            object_count: (root_stats.object_count + trace_stats.object_count) as u64,
            bytes_copied: (root_stats.bytes_copied + trace_stats.bytes_copied) as u64,
            cards_scanned: card_stats.0,
            decks_scanned: card_stats.1,
            card_scan_time_micros,
            code_heap_scanned,
        })
    }

    /// `copy_cards`: walk every generation older than `collecting`,
    /// applying the mask/unmask table from §4.2. Returns `(cards_scanned,
    /// decks_scanned)` to fold into the process-global counters.
    fn copy_cards(
        &mut self,
        heap: &mut Heap,
        collecting_gen: CollectingGen,
        collecting: GenKind,
        newspace_kind: GenKind,
        object_model: &dyn ObjectModel,
        code_heap: &mut dyn CodeHeap,
    ) -> Result<(u64, u64), NewspaceFull> {
        let mut cards_scanned = 0u64;
        let mut decks_scanned = 0u64;

        let older_kinds: Vec<GenKind> = heap.older_than(collecting).map(|g| g.kind()).collect();

        for older_kind in older_kinds {
            let (mask, unmask) = card_masks(collecting, older_kind, self.collecting_aging_again);
            let Some((mask, unmask)) = mask.zip(unmask) else {
                continue;
            };

            let here = heap.get(older_kind).expect("older generation exists").active().here();
            let ranges = {
                let Some(cards) = heap.get_mut(older_kind).expect("older generation exists").cards_mut() else {
                    continue;
                };
                let mut ranges = Vec::new();
                let scan_stats = cards.scan(here, mask, unmask, |start, end| ranges.push((start, end)));
                cards_scanned += scan_stats.cards_scanned as u64;
                decks_scanned += scan_stats.decks_scanned as u64;
                ranges
            };

            for (start, end) in ranges {
                scan_card_range(heap, collecting_gen, newspace_kind, object_model, code_heap, start, end)?;
            }
        }

        Ok((cards_scanned, decks_scanned))
    }

    /// Code-heap roots/sweep for this pass, dispatched per §4.5 step 9:
    /// scanned only when `collecting >= last_code_heap_scan` (a repeated
    /// minor collection that never promotes past where the code heap was
    /// last swept gains nothing from sweeping it again); tenured
    /// collections sweep unmarked code and re-derive marks next time,
    /// younger collections just trace code-block literals through the
    /// normal copy path. Returns 1 if a scan actually happened, so the
    /// caller can fold it into `code_heap_scans`.
    fn scan_code_heap_roots(&mut self, heap: &Heap, code_heap: &mut dyn CodeHeap, collecting: GenKind) -> u64 {
        let due = self.last_code_heap_scan.is_none_or(|last| collecting >= last);
        if !due {
            return 0;
        }

        if collecting == GenKind::Tenured {
            code_heap.free_unmarked();
            code_heap.unmark_marked();
        } else {
            code_heap.mark_active_blocks();
        }

        let is_accumulating = heap.get(collecting).is_some_and(|g| g.is_accumulating());
        self.last_code_heap_scan = Some(if is_accumulating { collecting } else { next_older(heap, collecting) });
        1
    }

    /// `end_gc`: fold this attempt's counters into `stats`, reset every
    /// generation younger than newspace (everything the collection
    /// subsumed and emptied: for a promote-in-place minor collection
    /// that's just the collected generation itself; for a rotated
    /// accumulating collection that's every generation younger than it,
    /// since `should_copy` for `Aging`/`Tenured` pulls reachable objects
    /// in from every younger generation too). Newspace itself is never
    /// reset here — `rotate` already gave it a clean slate before this
    /// attempt started, and it now holds the very data this collection
    /// produced. If this attempt grew the tenured generation, there is no
    /// separate old-heap object to dispose of (growth happened in place),
    /// so the only remaining step is clearing the flag.
    fn end_gc(&mut self, heap: &mut Heap, trace: TraceResult, elapsed_micros: u64) {
        self.stats
            .generation_mut(trace.collecting)
            .record(trace.object_count, trace.bytes_copied, elapsed_micros);
        self.stats.cards_scanned += trace.cards_scanned;
        self.stats.decks_scanned += trace.decks_scanned;
        self.stats.card_scan_time_micros += trace.card_scan_time_micros;
        self.stats.code_heap_scans += trace.code_heap_scanned;

        let newspace_index = heap.index_of(trace.newspace_kind).expect("newspace generation exists");
        if newspace_index > 0 {
            heap.reset_range(0, newspace_index - 1);
        }
        self.collecting_aging_again = false;
        self.growing = false;
    }
}

struct TraceResult {
    collecting: GenKind,
    newspace_kind: GenKind,
    object_count: u64,
    bytes_copied: u64,
    cards_scanned: u64,
    decks_scanned: u64,
    card_scan_time_micros: u64,
    code_heap_scanned: u64,
}

fn next_older(heap: &Heap, kind: GenKind) -> GenKind {
    heap.older_than(kind)
        .next()
        .map(crate::generation::Generation::kind)
        .unwrap_or(GenKind::Tenured)
}

/// The aging/tenured second-pass distinction only changes which card
/// `mask`/`unmask` the driver scans with (`card_masks`), not the copier's
/// `should_copy` predicate, so it has no bearing on which `CollectingGen`
/// the trace uses.
const fn as_collecting_gen(kind: GenKind) -> CollectingGen {
    match kind {
        GenKind::Nursery => CollectingGen::Nursery,
        GenKind::Aging => CollectingGen::Aging,
        GenKind::Tenured => CollectingGen::Tenured,
    }
}

/// The mask/unmask table from §4.2, as a function of which generation is
/// collecting and which older generation is being scanned. `None` means
/// that `(collecting, older)` pair never scans cards (e.g. collecting
/// tenured has no older generation to scan).
fn card_masks(collecting: GenKind, older: GenKind, aging_second_pass: bool) -> (Option<u8>, Option<u8>) {
    match (collecting, older) {
        (GenKind::Nursery, GenKind::Tenured) => (Some(POINTS_TO_NURSERY), Some(POINTS_TO_NURSERY)),
        (GenKind::Nursery, GenKind::Aging) => (Some(POINTS_TO_NURSERY), Some(ALL_MARKS)),
        (GenKind::Aging, GenKind::Tenured) if !aging_second_pass => (Some(POINTS_TO_AGING), Some(POINTS_TO_NURSERY)),
        (GenKind::Aging, GenKind::Tenured) => (Some(POINTS_TO_AGING), Some(ALL_MARKS)),
        _ => (None, None),
    }
}

/// Scan one card's address range for traced cells, updating any pointer
/// found in-place via the ordinary `copy_handle` path. A card holds
/// several objects; since the collector has no per-card object index in
/// this port, it re-derives object boundaries from the generation's start
/// the way the specification's "otherwise" fallback describes, stepping
/// an `ObjectModel::untagged_object_size` cursor until it reaches `start`,
/// then tracing every object whose header falls in `[start, end)`.
#[allow(clippy::too_many_arguments)]
fn scan_card_range(
    heap: &mut Heap,
    collecting_gen: CollectingGen,
    newspace_kind: GenKind,
    object_model: &dyn ObjectModel,
    code_heap: &mut dyn CodeHeap,
    start: crate::object::Address,
    end: crate::object::Address,
) -> Result<(), NewspaceFull> {
    let older_kind = heap.generation_containing(start).expect("card range lives in a known generation");
    let older_index = heap.index_of(older_kind).expect("generation kind is valid");

    let mut cursor = heap.get_index(older_index).expect("generation index is valid").active().start();
    while cursor < start {
        let size = {
            let zone = heap.get_index(older_index).expect("generation index is valid").active();
            object_model.untagged_object_size(zone, cursor)
        };
        cursor = cursor.offset(size);
    }

    while cursor < end {
        let (size, payload_start, offsets) = {
            let zone = heap.get_index(older_index).expect("generation index is valid").active();
            (
                object_model.untagged_object_size(zone, cursor),
                object_model.binary_payload_start(zone, cursor),
                object_model.trace(zone, cursor),
            )
        };

        for offset in offsets {
            if offset >= payload_start {
                continue;
            }
            let cell_addr = cursor.offset(offset);
            let raw = heap.get_index(older_index).expect("generation index is valid").active().read_word(cell_addr);
            let (updated, _bytes) = copier::copy_handle(
                heap,
                collecting_gen,
                newspace_kind,
                object_model,
                code_heap,
                crate::object::Cell(raw),
            )?;
            if updated.0 != raw {
                heap.get_index_mut(older_index)
                    .expect("generation index is valid")
                    .active_mut()
                    .write_word(cell_addr, updated.0);
            }
        }

        cursor = cursor.offset(size);
    }

    Ok(())
}
