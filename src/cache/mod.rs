//! Durable response cache for manifest URLs.
//!
//! This module owns every cached response: bulk population during a refresh
//! cycle, single-entry fills on the request path, and pruning against the
//! current manifest on activation.

mod storage;
mod store;
mod traits;

pub use storage::{MemoryResponseCache, SqliteResponseCache};
pub use store::CacheStore;
pub use traits::{CachedResponse, ResponseCache};
