//! Append-only order pool shared by every thread.
//!
//! Nodes are addressed by stable [`OrderHandle`] indices and are never freed
//! or reused while the pool lives, so a reader holding a handle to a node that
//! was unlinked a moment ago can still read it safely, and no CAS cell ever
//! sees the same handle come back (no ABA).
//!
//! Storage is a fixed directory of segments whose sizes double. A segment is
//! allocated by the one thread whose claimed index is its first slot; threads
//! that claim later slots before it is published spin until it appears.
//! Nothing is ever moved.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::fixed::Quantity;
use crate::order::{Order, OrderNode};

/// log2 of the first segment's slot count.
const FIRST_SEGMENT_BITS: u32 = 10;

/// Slots in the first segment.
const FIRST_SEGMENT: u64 = 1 << FIRST_SEGMENT_BITS;

/// Directory size. Total capacity is `FIRST_SEGMENT * (2^SEGMENTS - 1)`,
/// which stays below `u32::MAX` so every handle fits the link encoding.
const SEGMENTS: usize = 22;

/// Index into the order pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OrderHandle(pub u32);

impl OrderHandle {
    /// The empty link.
    pub const NIL: Self = Self(u32::MAX);

    /// Check if handle refers to a node.
    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for OrderHandle {
    fn default() -> Self {
        Self::NIL
    }
}

type Slot = OnceLock<OrderNode>;

/// Map a flat index to (segment, offset).
#[inline(always)]
fn locate(index: u64) -> (usize, usize) {
    let biased = index + FIRST_SEGMENT;
    let segment = (63 - biased.leading_zeros() - FIRST_SEGMENT_BITS) as usize;
    let offset = biased - (FIRST_SEGMENT << segment);
    (segment, offset as usize)
}

#[inline(always)]
const fn segment_len(segment: usize) -> usize {
    (FIRST_SEGMENT as usize) << segment
}

/// Concurrent, append-only pool of book nodes.
pub struct OrderPool {
    /// First slot of each installed segment, null until allocated.
    segments: [AtomicPtr<Slot>; SEGMENTS],
    /// Next unclaimed index.
    next: AtomicU64,
}

impl OrderPool {
    /// Maximum number of nodes a pool can hold.
    pub const CAPACITY: u64 = FIRST_SEGMENT * ((1 << SEGMENTS) - 1);

    /// Create an empty pool. No segment is allocated until first use.
    pub fn new() -> Self {
        Self {
            segments: core::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            next: AtomicU64::new(0),
        }
    }

    /// Store a node and return its handle.
    ///
    /// `next` is the node's initial packed link.
    ///
    /// # Panics
    /// Panics if [`Self::CAPACITY`] nodes have already been allocated.
    pub(crate) fn allocate(&self, order: Order, remaining: Quantity, next: u64) -> OrderHandle {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(index < Self::CAPACITY, "order pool exhausted");

        let (segment, offset) = locate(index);
        let base = self.segment_or_install(segment, offset);

        // SAFETY: `base` points at a live segment of `segment_len(segment)`
        // slots and `offset` is below that length by construction of `locate`.
        let slot = unsafe { &*base.add(offset) };
        // The index is ours alone, so the slot is always empty here.
        let _ = slot.set(OrderNode::new(order, remaining, next));

        OrderHandle(index as u32)
    }

    fn segment_or_install(&self, segment: usize, offset: usize) -> *mut Slot {
        let cell = &self.segments[segment];
        let current = cell.load(Ordering::Acquire);
        if !current.is_null() {
            return current;
        }

        if offset == 0 {
            // Indices are handed out contiguously, so exactly one thread
            // claims the first slot and it alone pays for the allocation.
            let fresh: Box<[Slot]> = (0..segment_len(segment)).map(|_| OnceLock::new()).collect();
            let fresh = Box::into_raw(fresh) as *mut Slot;
            cell.store(fresh, Ordering::Release);
            return fresh;
        }

        let mut spins = 0u32;
        loop {
            let current = cell.load(Ordering::Acquire);
            if !current.is_null() {
                return current;
            }
            if spins < 64 {
                core::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Look up a node.
    ///
    /// Returns `None` for handles this pool has not handed out.
    #[inline]
    pub fn get(&self, handle: OrderHandle) -> Option<&OrderNode> {
        if handle.is_nil() {
            return None;
        }
        let (segment, offset) = locate(handle.0 as u64);
        let base = self.segments[segment].load(Ordering::Acquire);
        if base.is_null() {
            return None;
        }
        // SAFETY: installed segments are never freed before `self` and have
        // `segment_len(segment)` slots; `offset` is in range.
        unsafe { (*base.add(offset)).get() }
    }

    /// Look up a node that is known to exist.
    ///
    /// Every handle stored in a book link came from `allocate` on this pool.
    #[inline(always)]
    pub(crate) fn node(&self, handle: OrderHandle) -> &OrderNode {
        match self.get(handle) {
            Some(node) => node,
            None => panic!("dangling order handle {}", handle.0),
        }
    }

    /// Number of nodes allocated so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(Self::CAPACITY) as usize
    }

    /// Check if nothing was allocated yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OrderPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OrderPool {
    fn drop(&mut self) {
        for (segment, cell) in self.segments.iter_mut().enumerate() {
            let base = *cell.get_mut();
            if !base.is_null() {
                // SAFETY: installed by `segment_or_install` from a boxed slice
                // of this length; `&mut self` rules out concurrent readers.
                unsafe {
                    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                        base,
                        segment_len(segment),
                    )));
                }
            }
        }
    }
}
