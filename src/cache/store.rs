//! Cache store that orchestrates lookups, bulk population and pruning
//! against a storage backend.

use color_eyre::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::ResponseCache;
use crate::http::{Request, Response, Transport};
use crate::routes::normalize_url;

/// The named durable response cache.
///
/// Read errors from the backend are swallowed here (logged, treated as a
/// miss): the request path must never fail because the caching machinery is
/// unavailable.
pub struct CacheStore {
  backend: Arc<dyn ResponseCache>,
}

impl CacheStore {
  pub fn new(backend: Arc<dyn ResponseCache>) -> Self {
    Self { backend }
  }

  /// Look up a response by its normalized URL, exact match only.
  pub fn lookup(&self, key: &str) -> Option<Response> {
    match self.backend.get(key) {
      Ok(hit) => hit.map(|cached| cached.response),
      Err(e) => {
        warn!(key, error = %e, "cache lookup failed, treating as miss");
        None
      }
    }
  }

  /// Store a single response. The response stays with the caller; the cache
  /// keeps its own copy.
  pub fn put(&self, key: &str, response: &Response) {
    if let Err(e) = self.backend.put(key, response) {
      warn!(key, error = %e, "failed to cache response");
    }
  }

  /// Fetch every manifest URL and store the OK responses.
  ///
  /// A failed or non-OK fetch leaves that entry stale or missing until the
  /// next successful refresh; the rest of the manifest is still populated.
  pub async fn put_all(&self, manifest: &[String], transport: &dyn Transport) -> Result<()> {
    for url in manifest {
      let response = match transport.fetch(&Request::get(url)).await {
        Ok(response) => response,
        Err(e) => {
          warn!(url, error = %e, "manifest fetch failed, skipping entry");
          continue;
        }
      };
      if !response.is_ok() {
        warn!(url, status = response.status, "manifest fetch returned non-OK, skipping entry");
        continue;
      }
      self.backend.put(&normalize_url(url), &response)?;
    }
    Ok(())
  }

  /// Delete every cached entry whose key is not in the current manifest.
  ///
  /// Safe to run concurrently with lookups; a concurrent reader may still
  /// observe an entry mid-prune.
  pub fn prune(&self, manifest: &[String]) -> Result<()> {
    let keep: BTreeSet<String> = manifest.iter().map(|url| normalize_url(url)).collect();

    for key in self.backend.keys()? {
      if !keep.contains(&key) {
        debug!(key, "pruning cache entry outside manifest");
        self.backend.delete(&key)?;
      }
    }
    Ok(())
  }
}
