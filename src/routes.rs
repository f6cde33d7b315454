//! URL normalization and the synthetic-endpoint registry.
//!
//! Incoming URLs are canonicalized to a comparison key before any routing
//! decision: query and fragment are dropped and a trailing slash is
//! stripped. Synthetic endpoints are routes served entirely from the local
//! record store; they never reach the cache or the network.

use url::Url;

/// Canonicalize a URL to its comparison key.
///
/// Accepts either an absolute URL or an absolute-path reference. The key is
/// the path with query/fragment removed and at most one trailing slash
/// stripped; the bare root stays `/`.
pub fn normalize_url(raw: &str) -> String {
  let path = match Url::parse(raw) {
    Ok(url) if !url.cannot_be_a_base() => url.path().to_string(),
    _ => raw
      .split(['?', '#'])
      .next()
      .unwrap_or("")
      .to_string(),
  };
  let stripped = path.strip_suffix('/').unwrap_or(path.as_str());
  if stripped.is_empty() {
    "/".to_string()
  } else {
    stripped.to_string()
  }
}

/// A request that can be answered from the local record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticRoute {
  /// `GET /api/keys` - list all record keys.
  RecordKeys,
  /// `GET /api/manifests/{id}` - fetch a single record.
  RecordById(String),
}

/// Match a normalized path against the synthetic endpoints, first match
/// wins. Returns `None` for everything that should go through the cache or
/// the network.
pub fn match_synthetic(path: &str) -> Option<SyntheticRoute> {
  if path == "/api/keys" {
    return Some(SyntheticRoute::RecordKeys);
  }
  if let Some(id) = path.strip_prefix("/api/manifests/") {
    if !id.is_empty() {
      return Some(SyntheticRoute::RecordById(id.to_string()));
    }
  }
  None
}
