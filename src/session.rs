//! Login-state machine driven by observed response statuses.
//!
//! The monitor owns the single logged-in flag. Every forwarded response
//! passes through `observe`: a 403 marks the session expired and raises a
//! login alert; the first non-403 after that clears the alert and schedules
//! a cache refresh. The coordinator's own session probe suppresses that
//! scheduling so a refresh never re-triggers itself.

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::alert::{AlertChannel, AlertTag};
use crate::http::{Request, Response, Transport};
use crate::refresh::RefreshReason;

/// HTTP status treated as the unauthenticated signal.
const FORBIDDEN: u16 = 403;

/// Whether a recovery transition may schedule a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryRefresh {
  /// Normal request path: recovery schedules a refresh.
  Schedule,
  /// The refresh cycle's own probe: recovery must not re-trigger a refresh.
  Suppress,
}

pub struct SessionMonitor {
  /// Optimistic: assume logged in until a 403 says otherwise.
  logged_in: Mutex<bool>,
  alerts: Arc<dyn AlertChannel>,
  alerts_enabled: bool,
  refresh_tx: mpsc::UnboundedSender<RefreshReason>,
}

impl SessionMonitor {
  pub fn new(
    alerts: Arc<dyn AlertChannel>,
    alerts_enabled: bool,
    refresh_tx: mpsc::UnboundedSender<RefreshReason>,
  ) -> Self {
    Self {
      logged_in: Mutex::new(true),
      alerts,
      alerts_enabled,
      refresh_tx,
    }
  }

  pub fn is_logged_in(&self) -> bool {
    *self.logged_in.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Forward a request through the transport and run the observed response
  /// through the state machine.
  pub async fn fetch(
    &self,
    transport: &dyn Transport,
    request: &Request,
    recovery: RecoveryRefresh,
  ) -> Result<Response> {
    let response = transport.fetch(request).await?;
    self.observe(&response, recovery);
    Ok(response)
  }

  /// Apply a response status to the login state machine.
  ///
  /// Transitions:
  /// - logged-in + 403: mark expired, raise the login alert
  /// - logged-out + non-403: mark recovered, clear login alerts, schedule a
  ///   refresh unless suppressed
  /// - anything else: no-op
  pub fn observe(&self, response: &Response, recovery: RecoveryRefresh) {
    let was_logged_in = {
      let mut logged_in = self.logged_in.lock().unwrap_or_else(|e| e.into_inner());
      let was = *logged_in;
      *logged_in = response.status != FORBIDDEN;
      was
    };

    if response.status == FORBIDDEN {
      if was_logged_in {
        debug!("session expired");
        if self.alerts_enabled {
          self
            .alerts
            .raise(AlertTag::Login, "Login expired\nPlease log in again");
        }
      }
    } else if !was_logged_in {
      debug!("session recovered");
      self.alerts.clear_all(AlertTag::Login);
      if recovery == RecoveryRefresh::Schedule {
        if self.refresh_tx.send(RefreshReason::SessionRecovered).is_err() {
          warn!("refresh channel closed, recovery refresh dropped");
        }
      }
    }
  }
}
