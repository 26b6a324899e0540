//! Fixed-size instrument table.
//!
//! Each bucket owns a bid book and an ask book. Symbols are mapped to buckets
//! by `|hash_code| % buckets`; symbols that collide share one pair of books.

use crate::book::PriceTimeBook;
use crate::config::EngineConfig;
use crate::order::{Side, Symbol};

/// The two books of one bucket.
#[derive(Debug)]
pub struct Bucket {
    /// Buy side, highest price first.
    pub bids: PriceTimeBook,
    /// Sell side, lowest price first.
    pub asks: PriceTimeBook,
}

impl Bucket {
    fn new() -> Self {
        Self {
            bids: PriceTimeBook::new(Side::Buy),
            asks: PriceTimeBook::new(Side::Sell),
        }
    }

    /// Book for `side`.
    #[inline(always)]
    pub fn side(&self, side: Side) -> &PriceTimeBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }
}

/// Bucket array addressed by symbol hash. Never resized.
#[derive(Debug)]
pub struct InstrumentTable {
    buckets: Box<[Bucket]>,
}

impl InstrumentTable {
    /// Allocate every bucket up front.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            buckets: (0..config.buckets()).map(|_| Bucket::new()).collect(),
        }
    }

    /// Bucket index for `symbol`.
    #[inline(always)]
    pub fn index_of(&self, symbol: &Symbol) -> usize {
        symbol.hash_code().unsigned_abs() as usize % self.buckets.len()
    }

    /// Bucket for `symbol`.
    #[inline(always)]
    pub fn bucket(&self, symbol: &Symbol) -> &Bucket {
        &self.buckets[self.index_of(symbol)]
    }

    /// Number of buckets.
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Always false; a table has at least one bucket.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
