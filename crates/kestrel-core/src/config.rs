//! Engine configuration.

use crate::error::ConfigError;

/// Reference instrument-table size.
pub const DEFAULT_BUCKETS: usize = 1024;

/// Largest supported instrument table.
pub const MAX_BUCKETS: usize = 1 << 20;

/// Sizing knobs fixed at engine construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    buckets: usize,
}

impl EngineConfig {
    /// Config with a custom bucket count.
    ///
    /// The count is fixed for the engine's lifetime; it only affects how
    /// often distinct symbols alias, never correctness.
    pub fn with_buckets(buckets: usize) -> Result<Self, ConfigError> {
        if buckets == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        if !buckets.is_power_of_two() {
            return Err(ConfigError::BucketCountNotPowerOfTwo(buckets));
        }
        if buckets > MAX_BUCKETS {
            return Err(ConfigError::TooManyBuckets { requested: buckets, max: MAX_BUCKETS });
        }
        Ok(Self { buckets })
    }

    /// Number of instrument-table buckets.
    #[inline]
    pub fn buckets(&self) -> usize {
        self.buckets
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { buckets: DEFAULT_BUCKETS }
    }
}
