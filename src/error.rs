use thiserror::Error;

/// Errors reported by this crate.
///
/// Configuration problems surface from the builders' `build` methods (or from
/// the specific call that needs missing configuration); they are never
/// papered over with a default value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("cache time-to-live must be greater than zero")]
    InvalidTtl,

    #[error("window size must be greater than zero")]
    InvalidWindow,

    #[error("expiration multiplier must be at least 1")]
    InvalidMultiplier,

    #[error("window size times expiration multiplier overflows a Duration")]
    TtlOverflow,

    #[error("expiration must be greater than zero")]
    InvalidExpiry,

    #[error("num_shards must be a non-zero power of two, got {0}")]
    InvalidShardCount(usize),

    #[error("no default expiration was configured for this set")]
    NoDefaultExpiry,

    #[error("counter limit of {limit} entries reached")]
    CapacityExceeded { limit: usize },

    #[error("iterator has no current element to remove")]
    NoCurrentElement,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
