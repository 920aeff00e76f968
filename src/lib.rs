//! Per-caller response cache for identity-governance API proxies.
//!
//! The surrounding proxy hands every request's category, parameters, and
//! raw caller credential to [`CacheFacade`]; ombra answers from its
//! embedded store or signals a miss, in which case the proxy fetches
//! fresh data upstream and writes it back through the facade.
//!
//! ```no_run
//! use ombra::{CacheFacade, Settings};
//!
//! # async fn example() -> Result<(), ombra::infra::error::InfraError> {
//! let settings = Settings::default();
//! let cache = CacheFacade::init(&settings).await?;
//!
//! let params = serde_json::Map::new();
//! let found = cache.lookup("list-identities", &params, "Bearer ...").await;
//! if !found.hit {
//!     // fetch fresh upstream, then:
//!     let payload = serde_json::json!({"items": []});
//!     cache.store("list-identities", &params, "Bearer ...", &payload).await;
//! }
//!
//! cache.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;

pub use cache::{CacheFacade, CacheLookup, FacadeStats};
pub use config::Settings;
