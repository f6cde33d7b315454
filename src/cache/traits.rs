//! Core trait and types for the response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::Response;

/// A cached response together with the time it was captured.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for response-cache storage backends.
///
/// Keys are normalized URLs (see `routes::normalize_url`). Per-key writes
/// are atomic; no cross-key consistency is promised, which is enough for a
/// cache that refresh fully repopulates.
pub trait ResponseCache: Send + Sync {
  /// Get a cached response by its normalized URL, exact match only.
  fn get(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Insert or replace the response for a key.
  fn put(&self, key: &str, response: &Response) -> Result<()>;

  /// All cached keys.
  fn keys(&self) -> Result<Vec<String>>;

  /// Remove a single entry.
  fn delete(&self, key: &str) -> Result<()>;
}
