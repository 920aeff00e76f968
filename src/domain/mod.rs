//! Domain records shared by the cache layers and the embedded store.

pub mod entries;

pub use entries::{CacheEntry, CacheKey, CacheStats, EntrySummary, IdentityLookupEntry};
