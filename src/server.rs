//! HTTP front that translates inbound requests into router dispatches.
//!
//! This is the intercepting surface only; every decision lives in
//! `RequestRouter`. The engine never sees axum types.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use color_eyre::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::error;

use crate::http::{Method, Request};
use crate::router::RequestRouter;

/// Cap on buffered request bodies.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct ProxyServer {
  addr: std::net::SocketAddr,
  shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProxyServer {
  /// Bind the listen address and start serving in the background.
  pub async fn start(listen: &str, router: Arc<RequestRouter>) -> Result<Self> {
    let listener = TcpListener::bind(listen).await?;
    let addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = axum::Router::new()
      .fallback(dispatch)
      .with_state(router);

    tokio::spawn(async move {
      axum::serve(listener, app)
        .with_graceful_shutdown(async {
          let _ = shutdown_rx.await;
        })
        .await
        .ok();
    });

    Ok(Self {
      addr,
      shutdown_tx: Some(shutdown_tx),
    })
  }

  pub fn addr(&self) -> std::net::SocketAddr {
    self.addr
  }

  /// Shutdown the server gracefully.
  pub fn shutdown(mut self) {
    if let Some(tx) = self.shutdown_tx.take() {
      let _ = tx.send(());
    }
  }
}

async fn dispatch(
  State(router): State<Arc<RequestRouter>>,
  inbound: axum::extract::Request,
) -> axum::response::Response {
  let (parts, body) = inbound.into_parts();

  let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
    Ok(body) => body,
    Err(e) => {
      error!(error = %e, "failed to read request body");
      return (StatusCode::BAD_REQUEST, "invalid request body").into_response();
    }
  };

  let request = Request {
    method: Method::parse(parts.method.as_str()),
    url: parts
      .uri
      .path_and_query()
      .map(|pq| pq.to_string())
      .unwrap_or_else(|| parts.uri.path().to_string()),
    headers: parts
      .headers
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect(),
    body: body.to_vec(),
  };

  match router.handle(&request).await {
    Ok(response) => {
      let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
      let mut headers = HeaderMap::new();
      for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
          HeaderName::try_from(name.as_str()),
          HeaderValue::try_from(value.as_str()),
        ) {
          headers.insert(name, value);
        }
      }
      (status, headers, Body::from(response.body)).into_response()
    }
    Err(e) => {
      error!(url = %request.url, error = %e, "request forwarding failed");
      (StatusCode::BAD_GATEWAY, format!("upstream error: {}", e)).into_response()
    }
  }
}
