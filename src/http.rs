//! HTTP domain types and the forwarding transport boundary.
//!
//! The proxy engine works on its own `Request`/`Response` types so the
//! routing and caching logic stays independent of any particular server or
//! client library. The `Transport` trait is the seam to the upstream API;
//! `HttpTransport` is the reqwest-backed implementation used by the binary.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
  Options,
  Other(String),
}

impl Method {
  pub fn parse(s: &str) -> Method {
    match s {
      "GET" => Method::Get,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "DELETE" => Method::Delete,
      "PATCH" => Method::Patch,
      "OPTIONS" => Method::Options,
      other => Method::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
      Method::Options => "OPTIONS",
      Method::Other(s) => s,
    }
  }
}

/// An inbound or forwarded request.
///
/// `url` is the absolute-path form (`/path?query`) relative to the upstream
/// base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: String,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Request {
  /// A bare GET request for the given URL.
  pub fn get(url: &str) -> Request {
    Request {
      method: Method::Get,
      url: url.to_string(),
      headers: HashMap::new(),
      body: Vec::new(),
    }
  }
}

/// A captured response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  /// Whether the status is in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Build a JSON response with the given status.
  pub fn json<T: Serialize>(status: u16, value: &T) -> Response {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Response {
      status,
      headers,
      body,
    }
  }

  /// Parse the body as JSON.
  pub fn json_body<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }
}

/// The forwarding boundary to the upstream API.
///
/// Errors from `fetch` represent transport-level failures (connection
/// refused, DNS, timeouts from the underlying client). Non-2xx responses are
/// returned as ordinary `Response` values.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Reqwest-backed transport that forwards path-form requests to a fixed
/// upstream base URL.
pub struct HttpTransport {
  client: reqwest::Client,
  base: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str) -> Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid upstream URL {}: {}", base_url, e))?;
    Ok(Self {
      client: reqwest::Client::new(),
      base,
    })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = self
      .base
      .join(&request.url)
      .map_err(|e| eyre!("Invalid request URL {}: {}", request.url, e))?;

    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method.as_str(), e))?;

    let mut builder = self.client.request(method, url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Upstream request failed: {}", e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read upstream body: {}", e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
