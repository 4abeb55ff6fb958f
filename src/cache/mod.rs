//! Disk-backed HTTP response cache.
//!
//! Responses are keyed by a fingerprint of the request path and query and
//! carry one of two TTLs depending on whether they came from the API or
//! from file serving. A background sweep drops expired entries and evicts
//! least recently accessed ones once the directory exceeds its size budget.

mod config;
mod keys;
mod middleware;
mod store;
mod sweeper;

pub use config::{BypassReason, CacheConfig, RequestClass};
pub use keys::fingerprint;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CacheError, CachedResponse, DiskCache, Lookup, SweepReport};
pub use sweeper::spawn_sweeper;
