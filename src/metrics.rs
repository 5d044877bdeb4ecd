//! Process-local draw counters.
use std::sync::atomic::{AtomicU64, Ordering};

static DRAWS: AtomicU64 = AtomicU64::new(0);
static PITY_FORCED: AtomicU64 = AtomicU64::new(0);
static NEW_CARDS: AtomicU64 = AtomicU64::new(0);
static EMPTY_CATALOG: AtomicU64 = AtomicU64::new(0);
static OVERLAY_FAILED: AtomicU64 = AtomicU64::new(0);
static RECONNECTS: AtomicU64 = AtomicU64::new(0);

pub fn inc_draws() { DRAWS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_pity_forced() { PITY_FORCED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_new_cards() { NEW_CARDS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_empty_catalog() { EMPTY_CATALOG.fetch_add(1, Ordering::Relaxed); }
pub fn inc_overlay_failed() { OVERLAY_FAILED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_reconnects() { RECONNECTS.fetch_add(1, Ordering::Relaxed); }

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub draws: u64,
    pub pity_forced: u64,
    pub new_cards: u64,
    pub empty_catalog: u64,
    pub overlay_failed: u64,
    pub reconnects: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        draws: DRAWS.load(Ordering::Relaxed),
        pity_forced: PITY_FORCED.load(Ordering::Relaxed),
        new_cards: NEW_CARDS.load(Ordering::Relaxed),
        empty_catalog: EMPTY_CATALOG.load(Ordering::Relaxed),
        overlay_failed: OVERLAY_FAILED.load(Ordering::Relaxed),
        reconnects: RECONNECTS.load(Ordering::Relaxed),
    }
}
