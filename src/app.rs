//! Application wiring and lifecycle.
//!
//! Startup runs one initial refresh (failures logged, never fatal),
//! activation prunes the cache against the current manifest before any
//! request is served, and the event loop reacts to push signals,
//! recovery-scheduled refreshes and alert clicks.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::alert::{AlertChannel, AlertEvent, AlertTag, ClientSurface};
use crate::cache::{CacheStore, ResponseCache};
use crate::config::Config;
use crate::http::Transport;
use crate::push::{PushChannel, PushEvent};
use crate::refresh::{RefreshCoordinator, RefreshReason};
use crate::router::RequestRouter;
use crate::session::SessionMonitor;
use crate::store::LocalStore;

pub struct App {
  config: Config,
  router: Arc<RequestRouter>,
  coordinator: Arc<RefreshCoordinator>,
  cache: Arc<CacheStore>,
  alerts: Arc<dyn AlertChannel>,
  clients: Arc<dyn ClientSurface>,
  push: PushChannel,
  refresh_rx: mpsc::UnboundedReceiver<RefreshReason>,
  alert_rx: mpsc::UnboundedReceiver<AlertEvent>,
}

impl App {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    config: Config,
    transport: Arc<dyn Transport>,
    cache_backend: Arc<dyn ResponseCache>,
    store: Arc<dyn LocalStore>,
    alerts: Arc<dyn AlertChannel>,
    clients: Arc<dyn ClientSurface>,
    push: PushChannel,
    alert_rx: mpsc::UnboundedReceiver<AlertEvent>,
  ) -> Self {
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

    let session = Arc::new(SessionMonitor::new(
      alerts.clone(),
      config.alerts.enabled,
      refresh_tx,
    ));
    let cache = Arc::new(CacheStore::new(cache_backend));

    let coordinator = Arc::new(RefreshCoordinator::new(
      transport.clone(),
      session.clone(),
      cache.clone(),
      store.clone(),
      config.cache.manifest.clone(),
      config.endpoints.session_probe.clone(),
      config.endpoints.dataset.clone(),
    ));

    let router = Arc::new(RequestRouter::new(
      cache.clone(),
      store,
      session,
      transport,
      &config.cache.manifest,
    ));

    Self {
      config,
      router,
      coordinator,
      cache,
      alerts,
      clients,
      push,
      refresh_rx,
      alert_rx,
    }
  }

  /// The dispatcher handed to the serving front.
  pub fn router(&self) -> Arc<RequestRouter> {
    self.router.clone()
  }

  /// Initial refresh. Its failure must not stop startup.
  pub async fn startup(&self) {
    let outcome = self.coordinator.refresh(RefreshReason::Startup).await;
    info!(?outcome, "startup refresh finished");
  }

  /// Cutover step: drop cache entries from a previous manifest before
  /// serving new requests.
  pub fn activate(&self) {
    if let Err(e) = self.cache.prune(&self.config.cache.manifest) {
      warn!(error = %e, "cache prune failed, stale entries may linger");
    }
    info!("ready to serve");
  }

  /// React to push signals, scheduled refreshes and alert clicks. Runs
  /// until the push channel closes; alert clicks take priority so a user
  /// action is never stuck behind a refresh trigger.
  ///
  /// Refreshes are spawned, not awaited inline: the loop keeps draining
  /// triggers while a cycle runs, so a burst of signals lands on the
  /// coordinator's shared in-flight future instead of queueing one full
  /// cycle per signal.
  pub async fn run(mut self) {
    let mut alerts_open = true;
    let mut refreshes = JoinSet::new();
    loop {
      tokio::select! {
        biased;
        event = self.alert_rx.recv(), if alerts_open => match event {
          Some(AlertEvent::Clicked(tag)) => self.handle_alert_click(tag),
          None => alerts_open = false,
        },
        Some(reason) = self.refresh_rx.recv() => {
          self.spawn_refresh(&mut refreshes, reason);
        },
        event = self.push.recv() => match event {
          Some(PushEvent::Refresh) => {
            info!("push signal received");
            self.spawn_refresh(&mut refreshes, RefreshReason::Push);
          }
          None => break,
        },
        Some(_) = refreshes.join_next() => {},
      }
    }
    // Let any refresh still in flight finish before shutting down.
    while refreshes.join_next().await.is_some() {}
  }

  fn spawn_refresh(&self, refreshes: &mut JoinSet<()>, reason: RefreshReason) {
    let coordinator = self.coordinator.clone();
    refreshes.spawn(async move {
      coordinator.refresh(reason).await;
    });
  }

  /// A clicked login alert is dismissed and every active client is sent to
  /// the login entry point.
  fn handle_alert_click(&self, tag: AlertTag) {
    self.alerts.clear_all(tag);
    match tag {
      AlertTag::Login => self.clients.navigate_all(&self.config.endpoints.login),
    }
  }
}
