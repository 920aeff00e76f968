//! Ombra response cache.
//!
//! Fronts a remote identity-governance API on behalf of many distinct
//! authenticated callers:
//!
//! - **Isolation is structural**: the caller's identity is part of every
//!   cache key, so no lookup can reach another caller's entry.
//! - **Mutations bypass**: write categories never touch the store.
//! - **Lazy expiry + sweep**: reads treat expired rows as absent; a
//!   background task reclaims them.
//!
//! ## Configuration
//!
//! Behavior is controlled via `ombra.toml` (or `OMBRA_*` environment
//! variables):
//!
//! ```toml
//! [cache]
//! enabled = true
//! db_path = "ombra_cache.db"
//! default_ttl_secs = 3600
//!
//! [sweep]
//! enabled = true
//! interval_secs = 3600
//! ```

mod facade;
mod identity;
mod keys;
mod sweeper;
mod ttl;

pub use facade::{CacheFacade, CacheLookup, FacadeStats};
pub use identity::caller_identity;
pub use keys::derive_key;
pub use sweeper::EvictionSweeper;
pub use ttl::{CachePolicy, TtlPolicy};
