//! In-memory caching with per-entry expiry.
//!
//! This module provides:
//! - `TtlCache`: generic key/value cache with lazy expiry on read
//! - `ResponseCache`: the read-through cache for GET responses (5 minutes)
//! - `cache_key`: deterministic key derivation from method, URL and query
//!
//! The app config object is cached separately for 1 hour by the API client.

pub mod response;
pub mod ttl;

pub use response::{cache_key, CachedResponse, ResponseCache, RESPONSE_CACHE_TTL};
pub use ttl::{CacheEntry, TtlCache};
