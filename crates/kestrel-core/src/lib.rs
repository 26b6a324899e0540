//! # Kestrel Core
//!
//! Lock-free continuous double-auction matching core.
//!
//! ## Design Principles
//! - One sorted, singly linked list per (instrument, side)
//! - Every shared cell is mutated by compare-and-swap only
//! - Conflicts are re-read and retried, never surfaced
//! - Nodes live in an append-only pool and are never freed while in use
//! - Fixed-point prices (no floats)

pub mod fixed;
pub mod order;
pub mod pool;
pub mod book;
pub mod table;
pub mod clock;
pub mod config;
pub mod error;
pub mod sink;
pub mod stats;
pub mod engine;

pub use fixed::{Price, Quantity};
pub use order::{Order, OrderId, OrderNode, Side, Symbol};
pub use pool::{OrderHandle, OrderPool};
pub use book::{BookIter, PriceTimeBook};
pub use table::{Bucket, InstrumentTable};
pub use clock::ArrivalClock;
pub use config::{EngineConfig, DEFAULT_BUCKETS, MAX_BUCKETS};
pub use error::{ConfigError, SymbolError};
pub use sink::{ChannelSink, MatchEvent, MatchSink, NullSink, TracingSink};
pub use stats::{ContentionStats, StatsSnapshot};
pub use engine::MatchingEngine;
