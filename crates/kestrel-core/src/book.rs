//! Lock-free price-time book for one side of one instrument.
//!
//! The book is a singly linked list of pool nodes sorted best-first. Inserts
//! link new nodes with a single CAS and restart from the head on any conflict.
//! Removal only ever takes the head, and only once its quantity is gone:
//!
//! 1. retire: CAS `remaining` from 0 to `RETIRED`,
//! 2. mark: set the mark bit on the node's `next` link,
//! 3. unlink: CAS the head from the node to its successor.
//!
//! The mark makes any insert that is about to link behind a departing node
//! fail its CAS and restart. If a better order was linked above a retired node
//! before step 3, the node stays marked in the list until a traversal meets it
//! and unlinks it on the way.
//!
//! Exhausted nodes that never reach the head stay linked with zero quantity.

use core::sync::atomic::{AtomicU32, Ordering};

use tracing::trace;

use crate::fixed::{Price, Quantity};
use crate::order::{OrderNode, Side};
use crate::pool::{OrderHandle, OrderPool};

/// Packed `next` cell: low 32 bits are the successor handle, bit 32 is the
/// removal mark of the node that owns the cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Link(u64);

impl Link {
    const MARK: u64 = 1 << 32;
    const HANDLE_MASK: u64 = u32::MAX as u64;

    #[inline(always)]
    pub(crate) const fn to(handle: OrderHandle) -> Self {
        Self(handle.0 as u64)
    }

    #[inline(always)]
    pub(crate) const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn handle(self) -> OrderHandle {
        OrderHandle((self.0 & Self::HANDLE_MASK) as u32)
    }

    #[inline(always)]
    pub(crate) const fn is_marked(self) -> bool {
        self.0 & Self::MARK != 0
    }

    #[inline(always)]
    const fn marked(self) -> Self {
        Self(self.0 | Self::MARK)
    }
}

#[inline(always)]
fn load_link(node: &OrderNode) -> Link {
    Link(node.next.load(Ordering::Acquire))
}

/// One side of one instrument's book.
#[derive(Debug)]
pub struct PriceTimeBook {
    /// Best node, or `OrderHandle::NIL`.
    head: AtomicU32,
    /// Priority direction.
    side: Side,
}

impl PriceTimeBook {
    /// Create an empty book for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            head: AtomicU32::new(OrderHandle::NIL.0),
            side,
        }
    }

    /// Priority direction of this book.
    #[inline(always)]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Current head handle, retired or not.
    #[inline(always)]
    pub fn peek_head(&self) -> Option<OrderHandle> {
        let head = OrderHandle(self.head.load(Ordering::Acquire));
        (!head.is_nil()).then_some(head)
    }

    /// Check if the head reference is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.peek_head().is_none()
    }

    /// Link `handle` at its price-time position.
    ///
    /// Never fails; retries until the node is linked. Returns the number of
    /// restarts caused by concurrent changes.
    pub fn insert(&self, pool: &OrderPool, handle: OrderHandle) -> u64 {
        let incoming = pool.node(handle);
        let mut restarts = 0u64;

        'restart: loop {
            let head = OrderHandle(self.head.load(Ordering::Acquire));

            if !head.is_nil() {
                let head_next = load_link(pool.node(head));
                if head_next.is_marked() {
                    // Head is on its way out: finish the unlink first.
                    let _ = self.cas_head(head, head_next.handle());
                    restarts += 1;
                    continue 'restart;
                }
            }

            if head.is_nil() || incoming.order().outranks(pool.node(head).order()) {
                incoming.next.store(Link::to(head).raw(), Ordering::Relaxed);
                if self.cas_head(head, handle) {
                    return restarts;
                }
                trace!(side = ?self.side, "head insert conflict");
                restarts += 1;
                continue 'restart;
            }

            let mut previous = head;
            let mut link = load_link(pool.node(previous));
            if link.is_marked() {
                restarts += 1;
                continue 'restart;
            }

            loop {
                let current = link.handle();
                if current.is_nil() {
                    break;
                }

                let node = pool.node(current);
                let after = load_link(node);
                if after.is_marked() {
                    // Help unlink the departing node, then start over.
                    let _ = pool.node(previous).next.compare_exchange(
                        link.raw(),
                        Link::to(after.handle()).raw(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    restarts += 1;
                    continue 'restart;
                }

                if incoming.order().outranks(node.order()) {
                    break;
                }

                previous = current;
                link = after;
            }

            incoming.next.store(link.raw(), Ordering::Relaxed);
            if pool
                .node(previous)
                .next
                .compare_exchange(
                    link.raw(),
                    Link::to(handle).raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return restarts;
            }

            trace!(side = ?self.side, "interior insert conflict");
            restarts += 1;
        }
    }

    /// Remove `expected` if it is still the head and is exhausted.
    ///
    /// Returns `true` only to the caller whose CAS unlinked the node. A
    /// `false` means the caller should re-read the head and try again.
    pub fn pop_head_if(&self, pool: &OrderPool, expected: OrderHandle) -> bool {
        if self.head.load(Ordering::Acquire) != expected.0 {
            return false;
        }

        let node = pool.node(expected);
        if !node.retire() {
            return false;
        }

        let mut link = load_link(node);
        while !link.is_marked() {
            match node.next.compare_exchange_weak(
                link.raw(),
                link.marked().raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => link = link.marked(),
                Err(actual) => link = Link(actual),
            }
        }

        self.cas_head(expected, link.handle())
    }

    #[inline(always)]
    fn cas_head(&self, expected: OrderHandle, new: OrderHandle) -> bool {
        self.head
            .compare_exchange(expected.0, new.0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Walk the live nodes best-first, skipping those marked for removal.
    ///
    /// Observational only; under concurrent mutation the walk may miss or
    /// include nodes that change while it runs.
    pub fn iter<'a>(&self, pool: &'a OrderPool) -> BookIter<'a> {
        BookIter {
            pool,
            cursor: OrderHandle(self.head.load(Ordering::Acquire)),
        }
    }

    /// Sum of remaining quantity over live nodes.
    pub fn resting_quantity(&self, pool: &OrderPool) -> Quantity {
        self.iter(pool)
            .fold(Quantity::ZERO, |acc, node| acc.saturating_add(node.remaining()))
    }

    /// `(price, remaining)` for each live node, best-first.
    pub fn depth(&self, pool: &OrderPool) -> Vec<(Price, Quantity)> {
        self.iter(pool)
            .map(|node| (node.order().price, node.remaining()))
            .collect()
    }
}

/// Iterator over a book's live nodes.
pub struct BookIter<'a> {
    pool: &'a OrderPool,
    cursor: OrderHandle,
}

impl<'a> Iterator for BookIter<'a> {
    type Item = &'a OrderNode;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.cursor.is_nil() {
            let node = self.pool.node(self.cursor);
            let link = load_link(node);
            self.cursor = link.handle();
            if !link.is_marked() {
                return Some(node);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, OrderId, Symbol};

    struct Fixture {
        pool: OrderPool,
        book: PriceTimeBook,
        next_id: u64,
    }

    impl Fixture {
        fn new(side: Side) -> Self {
            Self { pool: OrderPool::new(), book: PriceTimeBook::new(side), next_id: 1 }
        }

        fn add(&mut self, price: u64, qty: u64, arrival: u64) -> OrderHandle {
            let order = Order::new(
                OrderId(self.next_id),
                self.book.side(),
                Symbol::new("AAPL").unwrap(),
                Price::from_units(price),
                Quantity(qty),
                arrival,
            );
            self.next_id += 1;
            let handle = self.pool.allocate(order, Quantity(qty), Link::to(OrderHandle::NIL).raw());
            self.book.insert(&self.pool, handle);
            handle
        }

        fn ids(&self) -> Vec<u64> {
            self.book.iter(&self.pool).map(|n| n.order().id.0).collect()
        }

        fn exhaust(&self, handle: OrderHandle) {
            let node = self.pool.node(handle);
            let raw = node.remaining_raw();
            node.cas_remaining(raw, 0).unwrap();
        }
    }

    #[test]
    fn test_bid_order_by_price_desc() {
        let mut f = Fixture::new(Side::Buy);
        f.add(110, 100, 1);
        f.add(115, 50, 2);

        assert_eq!(
            f.book.depth(&f.pool),
            vec![(Price::from_units(115), Quantity(50)), (Price::from_units(110), Quantity(100))]
        );
    }

    #[test]
    fn test_ask_order_by_price_asc() {
        let mut f = Fixture::new(Side::Sell);
        f.add(120, 10, 1);
        f.add(108, 10, 2);
        f.add(115, 10, 3);
        f.add(130, 10, 4);

        assert_eq!(f.ids(), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_time_priority_within_price() {
        let mut f = Fixture::new(Side::Buy);
        f.add(100, 10, 5);
        f.add(100, 10, 3);
        f.add(100, 10, 7);
        // Same arrival as an existing order goes behind it.
        f.add(100, 10, 5);

        assert_eq!(f.ids(), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_pop_head_requires_exhaustion() {
        let mut f = Fixture::new(Side::Sell);
        let first = f.add(100, 10, 1);
        let second = f.add(101, 10, 2);

        assert!(!f.book.pop_head_if(&f.pool, first));
        assert!(!f.book.pop_head_if(&f.pool, second));

        f.exhaust(first);
        assert!(f.book.pop_head_if(&f.pool, first));
        assert_eq!(f.book.peek_head(), Some(second));
        assert!(f.pool.node(first).is_retired());

        // No longer the head.
        assert!(!f.book.pop_head_if(&f.pool, first));
    }

    #[test]
    fn test_exhausted_interior_node_stays_linked() {
        let mut f = Fixture::new(Side::Buy);
        let top = f.add(120, 10, 1);
        let middle = f.add(110, 10, 2);
        f.add(100, 10, 3);

        f.exhaust(middle);
        assert_eq!(f.ids(), vec![1, 2, 3]);
        assert_eq!(f.book.resting_quantity(&f.pool), Quantity(20));

        f.exhaust(top);
        assert!(f.book.pop_head_if(&f.pool, top));
        assert_eq!(f.book.peek_head(), Some(middle));
        assert!(f.book.pop_head_if(&f.pool, middle));
        assert_eq!(f.ids(), vec![3]);
    }

    #[test]
    fn test_marked_head_is_unlinked_by_insert() {
        let mut f = Fixture::new(Side::Buy);
        let head = f.add(110, 10, 1);
        f.add(100, 10, 2);

        // Retire and mark without unlinking, as a stalled remover would.
        f.exhaust(head);
        let node = f.pool.node(head);
        assert!(node.retire());
        let link = load_link(node);
        node.next.store(link.marked().raw(), Ordering::Release);

        f.add(105, 10, 3);
        assert_ne!(f.book.peek_head(), Some(head));
        assert_eq!(f.ids(), vec![3, 2]);
    }

    #[test]
    fn test_buried_marked_node_is_skipped_and_helped() {
        let mut f = Fixture::new(Side::Sell);
        let retired = f.add(100, 10, 1);
        f.add(105, 10, 2);

        f.exhaust(retired);
        let node = f.pool.node(retired);
        assert!(node.retire());
        node.next.store(load_link(node).marked().raw(), Ordering::Release);

        // A better ask lands above the departing node before it is unlinked.
        incoming_above(&mut f, 90, 3);
        assert_eq!(f.ids(), vec![3, 2]);

        // The next interior insert walks past it and unlinks it.
        f.add(103, 10, 4);
        assert_eq!(f.ids(), vec![3, 4, 2]);
        let raw: Vec<_> = RawWalk::new(&f).collect();
        assert!(!raw.contains(&retired));
    }

    fn incoming_above(f: &mut Fixture, price: u64, arrival: u64) {
        let head = f.book.peek_head().unwrap();
        let order = Order::new(
            OrderId(f.next_id),
            Side::Sell,
            Symbol::new("AAPL").unwrap(),
            Price::from_units(price),
            Quantity(10),
            arrival,
        );
        f.next_id += 1;
        let handle = f.pool.allocate(order, Quantity(10), Link::to(head).raw());
        assert!(f.book.cas_head(head, handle));
    }

    /// Every linked handle, marked or not.
    struct RawWalk<'a> {
        pool: &'a OrderPool,
        cursor: OrderHandle,
    }

    impl<'a> RawWalk<'a> {
        fn new(f: &'a Fixture) -> Self {
            Self { pool: &f.pool, cursor: f.book.peek_head().unwrap_or(OrderHandle::NIL) }
        }
    }

    impl Iterator for RawWalk<'_> {
        type Item = OrderHandle;

        fn next(&mut self) -> Option<OrderHandle> {
            if self.cursor.is_nil() {
                return None;
            }
            let here = self.cursor;
            self.cursor = load_link(self.pool.node(here)).handle();
            Some(here)
        }
    }

    #[test]
    fn test_concurrent_inserts_stay_sorted() {
        let pool = OrderPool::new();
        let book = PriceTimeBook::new(Side::Buy);
        let symbol = Symbol::new("AAPL").unwrap();

        std::thread::scope(|s| {
            for t in 0..4u64 {
                let (pool, book) = (&pool, &book);
                s.spawn(move || {
                    for i in 0..500u64 {
                        let price = 100 + (i * 7 + t * 13) % 50;
                        let order = Order::new(
                            OrderId(t * 1000 + i),
                            Side::Buy,
                            symbol,
                            Price::from_units(price),
                            Quantity(1),
                            i,
                        );
                        let h = pool.allocate(order, Quantity(1), Link::to(OrderHandle::NIL).raw());
                        book.insert(pool, h);
                    }
                });
            }
        });

        let nodes: Vec<_> = book.iter(&pool).collect();
        assert_eq!(nodes.len(), 2000);
        for pair in nodes.windows(2) {
            assert!(!pair[1].order().outranks(pair[0].order()));
        }
    }

    #[test]
    fn test_link_packing() {
        let link = Link::to(OrderHandle(42));
        assert_eq!(link.handle(), OrderHandle(42));
        assert!(!link.is_marked());
        assert!(link.marked().is_marked());
        assert_eq!(link.marked().handle(), OrderHandle(42));
        assert!(Link::to(OrderHandle::NIL).handle().is_nil());
    }
}
