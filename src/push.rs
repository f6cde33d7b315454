//! Push-signal channel that triggers cache refreshes.
//!
//! The signal transport itself is external; this module only defines the
//! channel the engine consumes and a long-poll HTTP source the binary can
//! wire in when the upstream exposes an events endpoint.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::http::{Request, Transport};

/// Backoff after a failed or non-OK poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// An inbound push signal. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
  Refresh,
}

/// Producer half handed to whatever transport delivers push signals.
#[derive(Clone)]
pub struct PushSender {
  tx: mpsc::UnboundedSender<PushEvent>,
}

impl PushSender {
  /// Deliver a push event. Returns false if the engine is gone.
  pub fn send(&self, event: PushEvent) -> bool {
    self.tx.send(event).is_ok()
  }
}

/// Consumer half owned by the application event loop.
pub struct PushChannel {
  rx: mpsc::UnboundedReceiver<PushEvent>,
}

impl PushChannel {
  /// Receive the next push event; `None` once every sender is dropped.
  pub async fn recv(&mut self) -> Option<PushEvent> {
    self.rx.recv().await
  }
}

/// Create a connected sender/channel pair.
pub fn channel() -> (PushSender, PushChannel) {
  let (tx, rx) = mpsc::unbounded_channel();
  (PushSender { tx }, PushChannel { rx })
}

/// Long-poll an upstream events endpoint, turning each completed poll into
/// a refresh signal. Runs until the engine drops its channel.
pub fn spawn_long_poll(url: String, transport: Arc<dyn Transport>, sender: PushSender) {
  tokio::spawn(async move {
    loop {
      match transport.fetch(&Request::get(&url)).await {
        Ok(response) if response.is_ok() => {
          debug!(url, "push poll completed, signalling refresh");
          if !sender.send(PushEvent::Refresh) {
            break;
          }
        }
        Ok(response) => {
          warn!(url, status = response.status, "push poll returned non-OK");
          tokio::time::sleep(POLL_RETRY_DELAY).await;
        }
        Err(e) => {
          warn!(url, error = %e, "push poll failed");
          tokio::time::sleep(POLL_RETRY_DELAY).await;
        }
      }
    }
  });
}
