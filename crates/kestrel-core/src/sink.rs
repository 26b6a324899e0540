//! Match-event sinks.
//!
//! The crossing thread calls [`MatchSink::on_match`] synchronously, once per
//! successful crossing, after both quantity decrements have landed.

use crossbeam_channel::Sender;
use tracing::info;

use crate::fixed::{Price, Quantity};
use crate::order::{OrderId, Symbol};

/// One crossing between a resting bid and a resting ask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchEvent {
    /// Instrument whose crossing loop produced the match.
    pub symbol: Symbol,
    /// Quantity transferred.
    pub quantity: Quantity,
    /// Execution price: the ask's limit price.
    pub price: Price,
    /// Bid that was decremented.
    pub bid: OrderId,
    /// Ask that was decremented.
    pub ask: OrderId,
    /// Bid quantity left after this match.
    pub bid_remaining: Quantity,
    /// Ask quantity left after this match.
    pub ask_remaining: Quantity,
}

/// Receiver of match events. Must tolerate calls from many threads at once.
pub trait MatchSink: Send + Sync {
    /// Called once per match.
    fn on_match(&self, event: &MatchEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MatchSink for NullSink {
    #[inline(always)]
    fn on_match(&self, _event: &MatchEvent) {}
}

/// Logs each match at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl MatchSink for TracingSink {
    fn on_match(&self, event: &MatchEvent) {
        info!(
            symbol = %event.symbol,
            quantity = event.quantity.0,
            price = %event.price,
            bid = event.bid.0,
            ask = event.ask.0,
            "matched {} shares of {} at {}",
            event.quantity,
            event.symbol,
            event.price,
        );
    }
}

/// Forwards events into a channel. Events are dropped once the receiver is gone.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<MatchEvent>,
}

impl ChannelSink {
    /// Wrap a sender.
    pub fn new(tx: Sender<MatchEvent>) -> Self {
        Self { tx }
    }
}

impl MatchSink for ChannelSink {
    #[inline]
    fn on_match(&self, event: &MatchEvent) {
        let _ = self.tx.send(*event);
    }
}

impl<F> MatchSink for F
where
    F: Fn(&MatchEvent) + Send + Sync,
{
    #[inline]
    fn on_match(&self, event: &MatchEvent) {
        self(event)
    }
}
