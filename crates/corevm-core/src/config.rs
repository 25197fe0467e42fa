//! Runtime configuration.
//!
//! Mirrors the shape of the teacher's `memory::config::GcConfig`: a plain
//! struct with a `Default` impl and a `from_env()` constructor that reads a
//! handful of environment variables by hand. There is no file-based or
//! `serde` config surface here — nothing in this crate's scope ever
//! persists configuration, so there would be nothing to round-trip.

use std::env;

/// Reserved head-room, in cells, kept above the top of every stack so that
/// a handful of pushes can happen before `fix_stacks` resets it. Carried
/// over from the original VM's `#define RESERVED (64 * CELLS)`.
pub const DEFAULT_RESERVED_CELLS: usize = 64;

/// Default card size in bytes (one mark byte per this many heap bytes).
pub const DEFAULT_CARD_BYTES: usize = 128;

/// Default number of cards summarized by one deck byte.
pub const DEFAULT_DECK_CARDS: usize = 32;

/// Heap and stack sizing, plus the `HAS_AGING` build-time toggle, collected
/// into one configuration value instead of scattered global constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Byte size of the nursery zone.
    pub nursery_size: usize,
    /// Byte size of the aging generation's active/semispace zones, if
    /// `has_aging` is set.
    pub aging_size: usize,
    /// Byte size of the tenured generation's active/semispace zones.
    pub tenured_size: usize,
    /// Whether an aging generation sits between nursery and tenured.
    pub has_aging: bool,
    /// Byte size of each context's data-stack segment.
    pub ds_size: usize,
    /// Byte size of each context's retain-stack segment.
    pub rs_size: usize,
    /// Head-room, in cells, `fix_stacks` preserves above the stack top.
    pub reserved_cells: usize,
    /// Heap bytes covered by one card mark byte.
    pub card_bytes: usize,
    /// Cards summarized by one deck byte.
    pub deck_cards: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            nursery_size: 1024 * 1024,
            aging_size: 4 * 1024 * 1024,
            tenured_size: 16 * 1024 * 1024,
            has_aging: true,
            ds_size: 64 * 1024,
            rs_size: 64 * 1024,
            reserved_cells: DEFAULT_RESERVED_CELLS,
            card_bytes: DEFAULT_CARD_BYTES,
            deck_cards: DEFAULT_DECK_CARDS,
        }
    }
}

impl CoreConfig {
    /// Build a config from defaults, then overlay any `COREVM_*`
    /// environment variables that parse cleanly. Unparseable or absent
    /// variables are silently left at their default, matching the
    /// teacher's `GcConfig::from_env`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("COREVM_NURSERY_SIZE")
            && let Ok(parsed) = v.parse()
        {
            config.nursery_size = parsed;
        }
        if let Ok(v) = env::var("COREVM_AGING_SIZE")
            && let Ok(parsed) = v.parse()
        {
            config.aging_size = parsed;
        }
        if let Ok(v) = env::var("COREVM_TENURED_SIZE")
            && let Ok(parsed) = v.parse()
        {
            config.tenured_size = parsed;
        }
        if let Ok(v) = env::var("COREVM_HAS_AGING")
            && let Ok(parsed) = v.parse()
        {
            config.has_aging = parsed;
        }
        if let Ok(v) = env::var("COREVM_DS_SIZE")
            && let Ok(parsed) = v.parse()
        {
            config.ds_size = parsed;
        }
        if let Ok(v) = env::var("COREVM_RS_SIZE")
            && let Ok(parsed) = v.parse()
        {
            config.rs_size = parsed;
        }

        config
    }
}
