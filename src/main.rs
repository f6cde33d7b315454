mod alert;
mod app;
mod cache;
mod config;
mod http;
mod push;
mod refresh;
mod router;
mod routes;
mod server;
mod session;
mod store;
#[cfg(test)]
mod testing;

use clap::Parser;
use color_eyre::Result;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alert::{AlertChannel, ClientSurface, LogAlerts, LogClients};
use cache::SqliteResponseCache;
use http::{HttpTransport, Transport};
use store::{LocalStore, SqliteLocalStore};

#[derive(Parser, Debug)]
#[command(name = "cachefront")]
#[command(about = "An intercepting cache proxy with session-aware refresh")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cachefront/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Listen address override (e.g. 127.0.0.1:8080)
  #[arg(short, long)]
  listen: Option<String>,
}

/// Initialize the tracing subscriber for logging.
fn init_tracing() {
  // RUST_LOG controls the level (e.g. RUST_LOG=debug).
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(filter)
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_tracing();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;
  let listen = args.listen.unwrap_or_else(|| config.listen.clone());

  let data_dir = config.data_dir()?;
  let cache_backend = Arc::new(SqliteResponseCache::open(&data_dir.join("responses.db"))?);
  let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::open(&data_dir.join("records.db"))?);
  let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.upstream.url)?);
  let alerts: Arc<dyn AlertChannel> = Arc::new(LogAlerts);
  let clients: Arc<dyn ClientSurface> = Arc::new(LogClients);

  let (push_tx, push_rx) = push::channel();
  if let Some(push_config) = &config.push {
    push::spawn_long_poll(push_config.poll_url.clone(), transport.clone(), push_tx.clone());
  }
  // Keep a sender alive so the event loop runs even without a push
  // transport configured.
  let _push_guard = push_tx;

  // The alert surface feeds clicks in here; the log-backed surface never
  // produces any, embedders wire their own sender.
  let (_alert_tx, alert_rx) = mpsc::unbounded_channel();

  let app = app::App::new(
    config,
    transport,
    cache_backend,
    store,
    alerts,
    clients,
    push_rx,
    alert_rx,
  );

  app.startup().await;
  app.activate();

  let server = server::ProxyServer::start(&listen, app.router()).await?;
  info!(addr = %server.addr(), "cachefront serving");

  app.run().await;
  server.shutdown();

  Ok(())
}
