//! Hard caps. Every limit failure surfaces as `EngineError::LimitExceeded`
//! (or an io error on the registry path) rather than unbounded growth.

use crate::model::Ms;

/// Smallest housing size the price table and allocation accept.
pub const CAPACITY_MIN: u8 = 1;

/// Largest housing size the price table and allocation accept.
pub const CAPACITY_MAX: u8 = 8;

/// Number of priced sizes.
pub const CAPACITY_COUNT: usize = CAPACITY_MAX as usize;

/// Upper bound for a unit price, in cents.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;

/// Properties a single registry may carry.
pub const MAX_PROPERTIES_PER_REGISTRY: usize = 100_000;

/// Rows a single query page may request.
pub const MAX_PAGE_SIZE: i64 = 1_000;

/// Registries (databases) a single server may load.
pub const MAX_REGISTRIES: usize = 64;

/// Length cap for a registry name before sanitization.
pub const MAX_REGISTRY_NAME_LEN: usize = 256;

/// Default lifetime of an allocation claim before the reaper releases it.
pub const DEFAULT_CLAIM_TTL_MS: Ms = 900_000;
