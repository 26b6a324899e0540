//! Order types and the shared book node.
//!
//! An [`Order`] is the immutable identity of a submission. The mutable part
//! (remaining quantity and the forward link) lives in [`OrderNode`] as atomic
//! cells that are only ever changed by compare-and-swap.

use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::SymbolError;
use crate::fixed::{Price, Quantity};

/// Sentinel stored in `remaining` once a node has been retired from its book.
///
/// No quantity CAS can succeed against a retired node.
pub(crate) const RETIRED: u64 = u64::MAX;

/// Side of the order book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Bid side (buyers).
    Buy = 0,
    /// Ask side (sellers).
    Sell = 1,
}

impl Side {
    /// Whether `price` is strictly better than `other` on this side.
    #[inline(always)]
    pub fn better_price(self, price: Price, other: Price) -> bool {
        match self {
            Side::Buy => price > other,
            Side::Sell => price < other,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// Instrument ticker stored inline so orders stay `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    bytes: [u8; Symbol::CAPACITY],
    len: u8,
}

impl Symbol {
    /// Longest supported ticker.
    pub const CAPACITY: usize = 15;

    /// Build a symbol from an ASCII ticker.
    pub fn new(ticker: &str) -> Result<Self, SymbolError> {
        if ticker.is_empty() {
            return Err(SymbolError::Empty);
        }
        if !ticker.is_ascii() {
            return Err(SymbolError::NotAscii);
        }
        if ticker.len() > Self::CAPACITY {
            return Err(SymbolError::TooLong { len: ticker.len(), max: Self::CAPACITY });
        }

        let mut bytes = [0u8; Self::CAPACITY];
        bytes[..ticker.len()].copy_from_slice(ticker.as_bytes());
        Ok(Self { bytes, len: ticker.len() as u8 })
    }

    /// The ticker text.
    pub fn as_str(&self) -> &str {
        // Only ASCII is ever stored.
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    /// 32-bit polynomial string hash (`h = 31 * h + byte`, wrapping).
    ///
    /// Distinct tickers may share a hash ("Aa" and "BB" do); such tickers
    /// land in the same table bucket.
    pub fn hash_code(&self) -> i32 {
        self.bytes[..self.len as usize]
            .iter()
            .fold(0i32, |h, &b| h.wrapping_mul(31).wrapping_add(b as i32))
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-assigned order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable identity of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,
    /// Order side (buy/sell).
    pub side: Side,
    /// Instrument.
    pub symbol: Symbol,
    /// Limit price.
    pub price: Price,
    /// Quantity requested at submission.
    pub quantity: Quantity,
    /// Arrival time in nanoseconds. Tie-break only; not unique.
    pub arrival: u64,
}

impl Order {
    /// Create a new order.
    #[inline(always)]
    pub fn new(
        id: OrderId,
        side: Side,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        arrival: u64,
    ) -> Self {
        Self { id, side, symbol, price, quantity, arrival }
    }

    /// Strict price-time priority: better price, or same price and earlier
    /// arrival. Equal orders do not outrank each other.
    #[inline(always)]
    pub fn outranks(&self, other: &Order) -> bool {
        self.side.better_price(self.price, other.price)
            || (self.price == other.price && self.arrival < other.arrival)
    }
}

/// An order as it sits in a book: identity plus the two CAS cells.
#[derive(Debug)]
pub struct OrderNode {
    order: Order,
    /// Remaining quantity, or [`RETIRED`].
    pub(crate) remaining: AtomicU64,
    /// Packed forward link, see `book::Link`.
    pub(crate) next: AtomicU64,
}

impl OrderNode {
    pub(crate) fn new(order: Order, remaining: Quantity, next: u64) -> Self {
        Self {
            order,
            remaining: AtomicU64::new(remaining.0),
            next: AtomicU64::new(next),
        }
    }

    /// The immutable order header.
    #[inline(always)]
    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Remaining quantity; zero once exhausted or retired.
    #[inline]
    pub fn remaining(&self) -> Quantity {
        match self.remaining.load(Ordering::Acquire) {
            RETIRED => Quantity::ZERO,
            raw => Quantity(raw),
        }
    }

    /// Whether the node has been retired from its book.
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == RETIRED
    }

    /// Whether the order has nothing left to trade.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Raw remaining cell, `RETIRED` included.
    #[inline(always)]
    pub(crate) fn remaining_raw(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// CAS `remaining` from `expected` to `new`.
    #[inline(always)]
    pub(crate) fn cas_remaining(&self, expected: u64, new: u64) -> Result<u64, u64> {
        self.remaining
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Claim an exhausted node for removal.
    ///
    /// Returns `true` if the node is retired after the call (by this thread or
    /// an earlier one) and `false` if it still holds quantity.
    pub(crate) fn retire(&self) -> bool {
        match self.cas_remaining(0, RETIRED) {
            Ok(_) => true,
            Err(actual) => actual == RETIRED,
        }
    }
}
