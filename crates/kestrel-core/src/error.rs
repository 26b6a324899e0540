//! Construction-time errors.
//!
//! The submit/cross path never fails; these only surface while building an
//! engine or a symbol.

use thiserror::Error;

/// Invalid engine configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A table needs at least one bucket.
    #[error("instrument table needs at least one bucket")]
    ZeroBuckets,

    /// Bucket count must be a power of two.
    #[error("bucket count {0} is not a power of two")]
    BucketCountNotPowerOfTwo(usize),

    /// Bucket count above the supported maximum.
    #[error("bucket count {requested} exceeds the maximum of {max}")]
    TooManyBuckets { requested: usize, max: usize },
}

/// Invalid instrument symbol.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    /// Empty ticker.
    #[error("symbol is empty")]
    Empty,

    /// Ticker longer than the inline capacity.
    #[error("symbol is {len} bytes, at most {max} are supported")]
    TooLong { len: usize, max: usize },

    /// Ticker contains non-ASCII bytes.
    #[error("symbol must be ASCII")]
    NotAscii,
}
