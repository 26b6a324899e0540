//! Matching engine core.
//!
//! Every submission inserts into its book and then runs the crossing loop for
//! its instrument. The loop reads both heads, and while they cross it moves
//! `min(bid, ask)` out of both with two CASes, undoing the first if the second
//! loses. There are no locks; every conflict is a re-read and a retry.

use core::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::book::{Link, PriceTimeBook};
use crate::clock::ArrivalClock;
use crate::config::EngineConfig;
use crate::fixed::{Price, Quantity};
use crate::order::{Order, OrderId, Side, Symbol, RETIRED};
use crate::pool::{OrderHandle, OrderPool};
use crate::sink::{MatchEvent, MatchSink, NullSink};
use crate::stats::{ContentionStats, StatsSnapshot};
use crate::table::{Bucket, InstrumentTable};

/// Continuous double-auction engine over a fixed instrument table.
///
/// Share it between threads by reference (`std::thread::scope`) or behind an
/// `Arc`; every method takes `&self`.
pub struct MatchingEngine<S: MatchSink = NullSink> {
    /// Bid/ask book pairs.
    table: InstrumentTable,
    /// Backing storage for every node ever inserted.
    pool: OrderPool,
    /// Receives one event per match.
    sink: S,
    /// Arrival timestamps.
    clock: ArrivalClock,
    /// Next order id.
    next_id: AtomicU64,
    /// Contention counters.
    stats: ContentionStats,
}

impl MatchingEngine<NullSink> {
    /// Engine with the reference table size that discards match events.
    pub fn new() -> Self {
        Self::with_sink(NullSink)
    }
}

impl Default for MatchingEngine<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MatchSink> MatchingEngine<S> {
    /// Engine with the default configuration.
    pub fn with_sink(sink: S) -> Self {
        Self::with_config(EngineConfig::default(), sink)
    }

    /// Engine with an explicit configuration.
    pub fn with_config(config: EngineConfig, sink: S) -> Self {
        Self::with_clock(config, sink, ArrivalClock::new())
    }

    /// Engine with an explicit arrival clock.
    pub fn with_clock(config: EngineConfig, sink: S, clock: ArrivalClock) -> Self {
        Self {
            table: InstrumentTable::new(&config),
            pool: OrderPool::new(),
            sink,
            clock,
            next_id: AtomicU64::new(1),
            stats: ContentionStats::new(),
        }
    }

    /// Submit a limit order stamped with the current arrival time.
    ///
    /// Inserts the order, then crosses the instrument's books until they no
    /// longer cross. Never fails.
    #[inline]
    pub fn submit(&self, side: Side, symbol: Symbol, quantity: Quantity, price: Price) -> OrderId {
        let arrival = self.clock.now();
        self.submit_at(side, symbol, quantity, price, arrival)
    }

    /// Submit with an explicit arrival time (replay and tests).
    pub fn submit_at(
        &self,
        side: Side,
        symbol: Symbol,
        quantity: Quantity,
        price: Price,
        arrival: u64,
    ) -> OrderId {
        let id = OrderId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let order = Order::new(id, side, symbol, price, quantity, arrival);

        let bucket = self.table.bucket(&symbol);
        self.rest(bucket.side(side), order, quantity);
        self.stats.orders(1);

        self.cross_bucket(symbol, bucket);
        id
    }

    /// Run the crossing loop for `symbol` without submitting anything.
    pub fn cross(&self, symbol: Symbol) {
        self.cross_bucket(symbol, self.table.bucket(&symbol));
    }

    fn rest(&self, book: &PriceTimeBook, order: Order, quantity: Quantity) {
        let handle = self.pool.allocate(order, quantity, Link::to(OrderHandle::NIL).raw());
        let restarts = book.insert(&self.pool, handle);
        if restarts > 0 {
            self.stats.insert_retries(restarts);
        }
    }

    /// The crossing loop. Returns once the heads no longer cross.
    fn cross_bucket(&self, symbol: Symbol, bucket: &Bucket) {
        loop {
            let (Some(bid_h), Some(ask_h)) = (bucket.bids.peek_head(), bucket.asks.peek_head())
            else {
                return;
            };
            let bid = self.pool.node(bid_h);
            let ask = self.pool.node(ask_h);

            if bid.order().price < ask.order().price {
                return;
            }

            let bid_qty = bid.remaining_raw();
            let ask_qty = ask.remaining_raw();

            // A head someone else exhausted (or is removing) comes off first.
            if bid_qty == 0 || bid_qty == RETIRED {
                self.unlink(&bucket.bids, bid_h);
                continue;
            }
            if ask_qty == 0 || ask_qty == RETIRED {
                self.unlink(&bucket.asks, ask_h);
                continue;
            }

            let matched = bid_qty.min(ask_qty);

            if bid.cas_remaining(bid_qty, bid_qty - matched).is_err() {
                trace!(%symbol, "bid quantity moved, retrying");
                self.stats.cross_retries(1);
                continue;
            }

            if ask.cas_remaining(ask_qty, ask_qty - matched).is_err() {
                trace!(%symbol, "ask quantity moved, rolling back bid");
                self.stats.cross_retries(1);
                self.roll_back(&bucket.bids, bid_h, bid_qty, matched);
                continue;
            }

            let event = MatchEvent {
                symbol,
                quantity: Quantity(matched),
                price: ask.order().price,
                bid: bid.order().id,
                ask: ask.order().id,
                bid_remaining: Quantity(bid_qty - matched),
                ask_remaining: Quantity(ask_qty - matched),
            };
            self.stats.matches(1);
            self.stats.matched_quantity(matched);
            self.sink.on_match(&event);

            if bid_qty == matched {
                self.unlink(&bucket.bids, bid_h);
            }
            if ask_qty == matched {
                self.unlink(&bucket.asks, ask_h);
            }
        }
    }

    #[inline]
    fn unlink(&self, book: &PriceTimeBook, head: OrderHandle) {
        if book.pop_head_if(&self.pool, head) {
            self.stats.unlinks(1);
        } else {
            self.stats.cross_retries(1);
        }
    }

    /// Give `matched` back to a bid whose paired ask decrement failed.
    ///
    /// Tries the exact reverse CAS first. If another crosser already moved
    /// the bid on, the quantity is added back to whatever is there now, and if
    /// the bid has been retired meanwhile it is re-inserted as a fresh node
    /// with the original price and arrival so it keeps its place.
    fn roll_back(&self, bids: &PriceTimeBook, bid_h: OrderHandle, bid_qty: u64, matched: u64) {
        let bid = self.pool.node(bid_h);

        let mut current = bid_qty - matched;
        match bid.cas_remaining(current, bid_qty) {
            Ok(_) => {
                self.stats.rollbacks(1);
                return;
            }
            Err(actual) => current = actual,
        }

        self.stats.rollback_repairs(1);
        while current != RETIRED {
            match bid.cas_remaining(current, current + matched) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }

        debug!(
            bid = bid.order().id.0,
            quantity = matched,
            "bid retired during rollback, re-inserting remainder"
        );
        self.stats.rehomed(1);
        self.rest(bids, *bid.order(), Quantity(matched));
    }

    /// Book for `symbol` on `side`.
    ///
    /// Symbols that share a bucket share this book.
    #[inline]
    pub fn book(&self, symbol: Symbol, side: Side) -> &PriceTimeBook {
        self.table.bucket(&symbol).side(side)
    }

    /// Bucket index `symbol` maps to.
    #[inline]
    pub fn bucket_index(&self, symbol: Symbol) -> usize {
        self.table.index_of(&symbol)
    }

    /// Price and remaining quantity of the bid head, if it is live.
    pub fn best_bid(&self, symbol: Symbol) -> Option<(Price, Quantity)> {
        self.best(symbol, Side::Buy)
    }

    /// Price and remaining quantity of the ask head, if it is live.
    pub fn best_ask(&self, symbol: Symbol) -> Option<(Price, Quantity)> {
        self.best(symbol, Side::Sell)
    }

    fn best(&self, symbol: Symbol, side: Side) -> Option<(Price, Quantity)> {
        self.book(symbol, side)
            .iter(&self.pool)
            .find(|node| !node.is_exhausted())
            .map(|node| (node.order().price, node.remaining()))
    }

    /// Head order of a book, exhausted or not.
    pub fn head(&self, symbol: Symbol, side: Side) -> Option<Order> {
        self.book(symbol, side)
            .peek_head()
            .and_then(|h| self.pool.get(h))
            .map(|node| *node.order())
    }

    /// Sum of remaining quantity resting on one side of `symbol`'s bucket.
    pub fn resting_quantity(&self, symbol: Symbol, side: Side) -> Quantity {
        self.book(symbol, side).resting_quantity(&self.pool)
    }

    /// `(price, remaining)` of every linked order, best first.
    ///
    /// Exhausted orders that have not reached the head yet show up with zero.
    pub fn depth(&self, symbol: Symbol, side: Side) -> Vec<(Price, Quantity)> {
        self.book(symbol, side).depth(&self.pool)
    }

    /// The order pool, for walking books directly.
    #[inline]
    pub fn pool(&self) -> &OrderPool {
        &self.pool
    }

    /// The match sink.
    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of instrument-table buckets.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.table.len()
    }

    /// Nodes allocated so far, re-inserted remainders included.
    #[inline]
    pub fn orders_allocated(&self) -> usize {
        self.pool.len()
    }

    /// Copy of the contention counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
