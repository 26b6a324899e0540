//! Contention counters.
//!
//! Relaxed counters bumped alongside the matching protocol. They describe
//! what happened; nothing reads them to make a decision.

use core::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by an engine.
#[derive(Debug, Default)]
pub struct ContentionStats {
    orders: AtomicU64,
    matches: AtomicU64,
    matched_quantity: AtomicU64,
    insert_retries: AtomicU64,
    cross_retries: AtomicU64,
    rollbacks: AtomicU64,
    rollback_repairs: AtomicU64,
    rehomed: AtomicU64,
    unlinks: AtomicU64,
}

/// Point-in-time copy of [`ContentionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Orders submitted.
    pub orders: u64,
    /// Match events emitted.
    pub matches: u64,
    /// Total quantity across match events.
    pub matched_quantity: u64,
    /// Insert restarts after a failed link CAS.
    pub insert_retries: u64,
    /// Crossing-loop restarts (quantity CAS lost, head moved).
    pub cross_retries: u64,
    /// Bid decrements undone with the exact reverse CAS.
    pub rollbacks: u64,
    /// Bid decrements that needed the slower restore path.
    pub rollback_repairs: u64,
    /// Restored quantity that had to be re-inserted as a new node.
    pub rehomed: u64,
    /// Exhausted heads unlinked.
    pub unlinks: u64,
}

macro_rules! bump {
    ($($name:ident),* $(,)?) => {
        $(
            #[inline(always)]
            pub(crate) fn $name(&self, by: u64) {
                self.$name.fetch_add(by, Ordering::Relaxed);
            }
        )*
    };
}

impl ContentionStats {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    bump!(
        orders,
        matches,
        matched_quantity,
        insert_retries,
        cross_retries,
        rollbacks,
        rollback_repairs,
        rehomed,
        unlinks,
    );

    /// Read every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            orders: self.orders.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            matched_quantity: self.matched_quantity.load(Ordering::Relaxed),
            insert_retries: self.insert_retries.load(Ordering::Relaxed),
            cross_retries: self.cross_retries.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            rollback_repairs: self.rollback_repairs.load(Ordering::Relaxed),
            rehomed: self.rehomed.load(Ordering::Relaxed),
            unlinks: self.unlinks.load(Ordering::Relaxed),
        }
    }
}
