//! Refresh coordinator: the single-flight cache refresh cycle.
//!
//! A cycle verifies the session, repopulates the response cache from the
//! manifest, then replaces the local record set from the dataset endpoint.
//! Triggers come from startup, a push signal, or session recovery; all of
//! them coalesce onto one shared in-flight future, so concurrent triggers
//! produce exactly one mutation cycle. Failures are logged and absorbed;
//! no trigger ever sees a refresh error.

use color_eyre::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::http::{Request, Transport};
use crate::session::{RecoveryRefresh, SessionMonitor};
use crate::store::LocalStore;

/// What prompted a refresh. Only used for logging and tests; every reason
/// runs the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
  Startup,
  Push,
  SessionRecovered,
}

/// Terminal state of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
  /// The cache was repopulated (record rebuild may have been skipped on a
  /// non-OK dataset response, which is intentional partial progress).
  Completed,
  /// The session probe came back non-OK; nothing was touched.
  NotLoggedIn,
  /// A network or store failure interrupted the cycle. Prior state for the
  /// failed step is left intact.
  Failed,
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

pub struct RefreshCoordinator {
  transport: Arc<dyn Transport>,
  session: Arc<SessionMonitor>,
  cache: Arc<CacheStore>,
  store: Arc<dyn LocalStore>,
  manifest: Vec<String>,
  probe_url: String,
  dataset_url: String,
  inflight: Mutex<Option<InFlight>>,
}

impl RefreshCoordinator {
  pub fn new(
    transport: Arc<dyn Transport>,
    session: Arc<SessionMonitor>,
    cache: Arc<CacheStore>,
    store: Arc<dyn LocalStore>,
    manifest: Vec<String>,
    probe_url: String,
    dataset_url: String,
  ) -> Self {
    Self {
      transport,
      session,
      cache,
      store,
      manifest,
      probe_url,
      dataset_url,
      inflight: Mutex::new(None),
    }
  }

  /// Run a refresh cycle, coalescing with any cycle already in flight.
  ///
  /// A trigger arriving mid-refresh awaits the same shared future instead
  /// of starting a second cycle; there is no queue of pending refreshes.
  pub async fn refresh(self: &Arc<Self>, reason: RefreshReason) -> RefreshOutcome {
    let future = {
      let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
      if let Some(future) = inflight.as_ref() {
        debug!(?reason, "refresh already in flight, joining");
        future.clone()
      } else {
        info!(?reason, "starting refresh cycle");
        let this = Arc::clone(self);
        let future: InFlight = async move {
          let outcome = this.run_cycle().await;
          *this.inflight.lock().unwrap_or_else(|e| e.into_inner()) = None;
          outcome
        }
        .boxed()
        .shared();
        *inflight = Some(future.clone());
        future
      }
    };
    future.await
  }

  /// One full refresh cycle: probe, repopulate cache, rebuild records.
  async fn run_cycle(&self) -> RefreshOutcome {
    // Probe session liveness first, suppressing recovery refresh scheduling
    // so this cycle cannot re-trigger itself.
    let probe = Request::get(&self.probe_url);
    let response = match self
      .session
      .fetch(self.transport.as_ref(), &probe, RecoveryRefresh::Suppress)
      .await
    {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, "session probe failed, leaving cache untouched");
        return RefreshOutcome::Failed;
      }
    };
    if !response.is_ok() {
      info!(status = response.status, "not logged in, skipping refresh");
      return RefreshOutcome::NotLoggedIn;
    }

    // Repopulate the response cache from the manifest.
    if let Err(e) = self
      .cache
      .put_all(&self.manifest, self.transport.as_ref())
      .await
    {
      warn!(error = %e, "cache repopulation failed");
      return RefreshOutcome::Failed;
    }

    // Fetch the record dataset. A non-OK response stops here: the cache is
    // already refreshed, the previous record set stays.
    let dataset = match self.transport.fetch(&Request::get(&self.dataset_url)).await {
      Ok(response) if response.is_ok() => response,
      Ok(response) => {
        warn!(
          status = response.status,
          "record dataset returned non-OK, keeping previous records"
        );
        return RefreshOutcome::Completed;
      }
      Err(e) => {
        warn!(error = %e, "record dataset fetch failed, keeping previous records");
        return RefreshOutcome::Failed;
      }
    };

    let records: Vec<Value> = match dataset.json_body() {
      Ok(records) => records,
      Err(e) => {
        warn!(error = %e, "record dataset is not a JSON array, keeping previous records");
        return RefreshOutcome::Failed;
      }
    };

    if let Err(e) = self.rebuild_records(&records) {
      warn!(error = %e, "record store rebuild failed");
      return RefreshOutcome::Failed;
    }

    info!(records = records.len(), "refresh cycle complete");
    RefreshOutcome::Completed
  }

  /// Replace the record set wholesale: clear, then insert every record
  /// keyed by its `key_path`. Readers during this window may observe an
  /// empty or partially-populated store; refresh is infrequent enough that
  /// this race is accepted.
  fn rebuild_records(&self, records: &[Value]) -> Result<()> {
    self.store.clear()?;
    for record in records {
      match record.get("key_path").and_then(Value::as_str) {
        Some(key) => self.store.put(key, record)?,
        None => warn!(%record, "record without key_path skipped"),
      }
    }
    Ok(())
  }
}
