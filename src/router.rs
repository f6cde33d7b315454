//! Top-level request dispatcher.
//!
//! Every inbound GET is routed: synthetic endpoints are answered from the
//! local record store, manifest URLs are served from the response cache
//! when possible, and everything else is forwarded upstream through the
//! session monitor. Cacheable responses fill the cache on the way back.
//! Non-GET requests pass straight through untouched.

use color_eyre::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::http::{Method, Request, Response, Transport};
use crate::routes::{match_synthetic, normalize_url, SyntheticRoute};
use crate::session::{RecoveryRefresh, SessionMonitor};
use crate::store::LocalStore;

pub struct RequestRouter {
  cache: Arc<CacheStore>,
  store: Arc<dyn LocalStore>,
  session: Arc<SessionMonitor>,
  transport: Arc<dyn Transport>,
  /// Normalized manifest URLs eligible for persistent caching.
  manifest: BTreeSet<String>,
}

impl RequestRouter {
  pub fn new(
    cache: Arc<CacheStore>,
    store: Arc<dyn LocalStore>,
    session: Arc<SessionMonitor>,
    transport: Arc<dyn Transport>,
    manifest: &[String],
  ) -> Self {
    Self {
      cache,
      store,
      session,
      transport,
      manifest: manifest.iter().map(|url| normalize_url(url)).collect(),
    }
  }

  /// Resolve an inbound request to a response.
  ///
  /// Only transport failures on the forwarding path surface as errors; the
  /// caller gets the request's natural failure. Cache-internal errors never
  /// fail the request.
  pub async fn handle(&self, request: &Request) -> Result<Response> {
    if request.method != Method::Get {
      return self.transport.fetch(request).await;
    }

    // Comparison key only; the outgoing request keeps its original URL.
    let normalized = normalize_url(&request.url);

    if let Some(route) = match_synthetic(&normalized) {
      return Ok(self.serve_synthetic(&route));
    }

    let cacheable = self.manifest.contains(&normalized);
    if cacheable {
      if let Some(hit) = self.cache.lookup(&normalized) {
        debug!(url = %normalized, "cache hit");
        return Ok(hit);
      }
    }

    let response = self
      .session
      .fetch(self.transport.as_ref(), request, RecoveryRefresh::Schedule)
      .await?;

    if cacheable && response.is_ok() {
      debug!(url = %normalized, "filling cache from network response");
      self.cache.put(&normalized, &response);
    }

    Ok(response)
  }

  /// Answer a synthetic route from the local record store: a 200 JSON body,
  /// or 404 when the record is absent. Store errors are logged and treated
  /// as absent.
  fn serve_synthetic(&self, route: &SyntheticRoute) -> Response {
    match route {
      SyntheticRoute::RecordKeys => match self.store.keys() {
        Ok(keys) => Response::json(200, &keys),
        Err(e) => {
          warn!(error = %e, "record key listing failed");
          Response::json(404, &Value::Null)
        }
      },
      SyntheticRoute::RecordById(id) => match self.store.get(id) {
        Ok(Some(value)) => Response::json(200, &value),
        Ok(None) => Response::json(404, &Value::Null),
        Err(e) => {
          warn!(id, error = %e, "record lookup failed");
          Response::json(404, &Value::Null)
        }
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alert::AlertChannel;
  use crate::cache::MemoryResponseCache;
  use crate::refresh::{RefreshCoordinator, RefreshReason};
  use crate::store::MemoryLocalStore;
  use crate::testing::{MockTransport, RecordingAlerts};
  use serde_json::json;
  use tokio::sync::mpsc;

  struct Fixture {
    router: RequestRouter,
    transport: Arc<MockTransport>,
    cache: Arc<CacheStore>,
    store: Arc<MemoryLocalStore>,
    session: Arc<SessionMonitor>,
    refresh_rx: mpsc::UnboundedReceiver<crate::refresh::RefreshReason>,
  }

  fn fixture(manifest: &[&str]) -> Fixture {
    let transport = Arc::new(MockTransport::new());
    let alerts: Arc<dyn AlertChannel> = Arc::new(RecordingAlerts::new());
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
    let session = Arc::new(SessionMonitor::new(alerts, true, refresh_tx));
    let cache = Arc::new(CacheStore::new(Arc::new(MemoryResponseCache::new())));
    let store = Arc::new(MemoryLocalStore::new());
    let manifest: Vec<String> = manifest.iter().map(|s| s.to_string()).collect();

    let router = RequestRouter::new(
      cache.clone(),
      store.clone(),
      session.clone(),
      transport.clone(),
      &manifest,
    );

    Fixture {
      router,
      transport,
      cache,
      store,
      session,
      refresh_rx,
    }
  }

  #[tokio::test]
  async fn synthetic_keys_never_touch_the_network() {
    // Even with the synthetic path in the manifest, local state wins.
    let f = fixture(&["/api/keys"]);
    f.store.put("a", &json!({"key_path": "a"})).unwrap();
    f.store.put("b", &json!({"key_path": "b"})).unwrap();

    let response = f.router.handle(&Request::get("/api/keys")).await.unwrap();

    assert_eq!(response.status, 200);
    let keys: Vec<String> = response.json_body().unwrap();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(f.transport.total_fetches(), 0);
  }

  #[tokio::test]
  async fn synthetic_record_lookup_hits_and_misses() {
    let f = fixture(&[]);
    f.store
      .put("a", &json!({"key_path": "a", "value": 1}))
      .unwrap();

    let hit = f
      .router
      .handle(&Request::get("/api/manifests/a"))
      .await
      .unwrap();
    assert_eq!(hit.status, 200);
    let value: Value = hit.json_body().unwrap();
    assert_eq!(value, json!({"key_path": "a", "value": 1}));

    let miss = f
      .router
      .handle(&Request::get("/api/manifests/nope"))
      .await
      .unwrap();
    assert_eq!(miss.status, 404);
    assert_eq!(f.transport.total_fetches(), 0);
  }

  #[tokio::test]
  async fn cache_hit_skips_the_network() {
    let f = fixture(&["/app.js"]);
    f.cache.put(
      "/app.js",
      &Response {
        status: 200,
        headers: Default::default(),
        body: b"cached".to_vec(),
      },
    );

    let response = f.router.handle(&Request::get("/app.js")).await.unwrap();

    assert_eq!(response.body, b"cached");
    assert_eq!(f.transport.total_fetches(), 0);
  }

  #[tokio::test]
  async fn trailing_slash_matches_the_cached_entry() {
    let f = fixture(&["/app.js"]);
    f.cache.put(
      "/app.js",
      &Response {
        status: 200,
        headers: Default::default(),
        body: b"cached".to_vec(),
      },
    );

    let response = f.router.handle(&Request::get("/app.js/")).await.unwrap();
    assert_eq!(response.body, b"cached");
  }

  #[tokio::test]
  async fn cache_miss_fetches_and_fills() {
    let f = fixture(&["/app.js"]);
    f.transport.respond("/app.js", 200, b"fresh");

    let response = f.router.handle(&Request::get("/app.js")).await.unwrap();

    assert_eq!(response.body, b"fresh");
    assert_eq!(f.transport.fetch_count("/app.js"), 1);
    // Next request is served from cache.
    let again = f.router.handle(&Request::get("/app.js")).await.unwrap();
    assert_eq!(again.body, b"fresh");
    assert_eq!(f.transport.fetch_count("/app.js"), 1);
  }

  #[tokio::test]
  async fn non_ok_responses_are_not_cached() {
    let f = fixture(&["/app.js"]);
    f.transport.respond("/app.js", 500, b"boom");

    let response = f.router.handle(&Request::get("/app.js")).await.unwrap();
    assert_eq!(response.status, 500);
    assert!(f.cache.lookup("/app.js").is_none());
  }

  #[tokio::test]
  async fn non_manifest_urls_are_forwarded_not_cached() {
    let f = fixture(&["/app.js"]);
    f.transport.respond("/api/data", 200, b"data");

    let response = f.router.handle(&Request::get("/api/data")).await.unwrap();

    assert_eq!(response.body, b"data");
    assert!(f.cache.lookup("/api/data").is_none());
  }

  #[tokio::test]
  async fn non_get_requests_pass_through() {
    let f = fixture(&["/app.js"]);
    f.transport.respond("/app.js", 200, b"posted");

    let request = Request {
      method: Method::Post,
      url: "/app.js".to_string(),
      headers: Default::default(),
      body: b"payload".to_vec(),
    };
    let response = f.router.handle(&request).await.unwrap();

    assert_eq!(response.body, b"posted");
    // Pass-through does not consult or fill the cache.
    assert!(f.cache.lookup("/app.js").is_none());
  }

  #[tokio::test]
  async fn forbidden_response_flips_session_state() {
    let f = fixture(&[]);
    f.transport.respond("/api/data", 403, b"");

    let response = f.router.handle(&Request::get("/api/data")).await.unwrap();

    assert_eq!(response.status, 403);
    assert!(!f.session.is_logged_in());
  }

  #[tokio::test]
  async fn recovery_through_the_request_path_schedules_a_refresh() {
    let mut f = fixture(&[]);
    f.transport.enqueue("/api/data", 403, b"");
    f.transport.enqueue("/api/data", 200, b"back");

    f.router.handle(&Request::get("/api/data")).await.unwrap();
    assert!(!f.session.is_logged_in());

    let response = f.router.handle(&Request::get("/api/data")).await.unwrap();
    assert_eq!(response.body, b"back");
    assert!(f.session.is_logged_in());
    assert_eq!(
      f.refresh_rx.try_recv().ok(),
      Some(crate::refresh::RefreshReason::SessionRecovered)
    );
    assert!(f.refresh_rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn transport_failure_surfaces_to_the_caller() {
    let f = fixture(&[]);
    f.transport.fail("/api/data", "connection refused");

    let result = f.router.handle(&Request::get("/api/data")).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn end_to_end_refresh_then_serve() {
    let f = fixture(&["/app.js"]);
    f.transport.respond("/api/session", 200, b"");
    f.transport.respond("/app.js", 200, b"console.log(1)");
    f.transport
      .respond_json("/api/records", 200, &json!([{"key_path": "a", "value": 1}]));

    let coordinator = Arc::new(RefreshCoordinator::new(
      f.transport.clone(),
      f.session.clone(),
      f.cache.clone(),
      f.store.clone(),
      vec!["/app.js".to_string()],
      "/api/session".to_string(),
      "/api/records".to_string(),
    ));
    coordinator.refresh(RefreshReason::Startup).await;

    // Cached entry served without another fetch.
    let app = f.router.handle(&Request::get("/app.js")).await.unwrap();
    assert_eq!(app.body, b"console.log(1)");
    assert_eq!(f.transport.fetch_count("/app.js"), 1);

    // Synthetic record lookup.
    let record = f
      .router
      .handle(&Request::get("/api/manifests/a"))
      .await
      .unwrap();
    let value: Value = record.json_body().unwrap();
    assert_eq!(value, json!({"key_path": "a", "value": 1}));

    // Synthetic key listing.
    let keys = f.router.handle(&Request::get("/api/keys")).await.unwrap();
    let keys: Vec<String> = keys.json_body().unwrap();
    assert_eq!(keys, vec!["a"]);
  }
}
