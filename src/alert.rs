//! Alert and client-navigation surfaces.
//!
//! Both are external capabilities: the engine only decides *when* to raise,
//! clear or navigate. The log-backed implementations are what the binary
//! wires in; deployments embed their own (desktop notifications, web push).

use tracing::info;

/// Tag identifying a class of alerts. Clearing is always tag-scoped so
/// unrelated alerts survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTag {
  /// The session has expired and the user must log in again.
  Login,
}

impl AlertTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      AlertTag::Login => "login",
    }
  }
}

/// Outbound user-visible notifications. Alerts are persistent and require
/// explicit dismissal on the consumer side.
pub trait AlertChannel: Send + Sync {
  fn raise(&self, tag: AlertTag, message: &str);

  /// Dismiss every outstanding alert with the given tag, nothing else.
  fn clear_all(&self, tag: AlertTag);
}

/// Inbound user actions on alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvent {
  Clicked(AlertTag),
}

/// The population of active clients that can be redirected.
pub trait ClientSurface: Send + Sync {
  /// Navigate every active client to the given URL.
  fn navigate_all(&self, url: &str);
}

/// Alert channel that only logs. Stands in where no notification surface is
/// attached.
pub struct LogAlerts;

impl AlertChannel for LogAlerts {
  fn raise(&self, tag: AlertTag, message: &str) {
    info!(tag = tag.as_str(), message, "alert raised");
  }

  fn clear_all(&self, tag: AlertTag) {
    info!(tag = tag.as_str(), "alerts cleared");
  }
}

/// Client surface that only logs.
pub struct LogClients;

impl ClientSurface for LogClients {
  fn navigate_all(&self, url: &str) {
    info!(url, "navigating all clients");
  }
}
