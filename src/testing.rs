//! Shared test doubles for the transport and the external surfaces.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::alert::{AlertChannel, AlertTag, ClientSurface};
use crate::http::{Request, Response, Transport};

enum Reply {
  Response(Response),
  Error(String),
}

/// Scripted transport keyed by raw request URL.
///
/// Each URL holds a queue of replies; the last reply repeats once the queue
/// runs down, so a single `respond` covers any number of fetches. Unknown
/// URLs answer 404. Every fetch yields once, mimicking suspension at the
/// I/O boundary.
#[derive(Default)]
pub struct MockTransport {
  replies: Mutex<HashMap<String, VecDeque<Reply>>>,
  log: Mutex<Vec<String>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set a single repeating reply for a URL.
  pub fn respond(&self, url: &str, status: u16, body: &[u8]) {
    let response = Response {
      status,
      headers: HashMap::new(),
      body: body.to_vec(),
    };
    let mut replies = self.replies.lock().unwrap();
    replies.insert(url.to_string(), VecDeque::from([Reply::Response(response)]));
  }

  /// Set a single repeating JSON reply for a URL.
  pub fn respond_json<T: Serialize>(&self, url: &str, status: u16, value: &T) {
    let mut replies = self.replies.lock().unwrap();
    replies.insert(
      url.to_string(),
      VecDeque::from([Reply::Response(Response::json(status, value))]),
    );
  }

  /// Append a reply to a URL's queue.
  pub fn enqueue(&self, url: &str, status: u16, body: &[u8]) {
    let response = Response {
      status,
      headers: HashMap::new(),
      body: body.to_vec(),
    };
    let mut replies = self.replies.lock().unwrap();
    replies
      .entry(url.to_string())
      .or_default()
      .push_back(Reply::Response(response));
  }

  /// Make fetches of a URL fail at the transport level.
  pub fn fail(&self, url: &str, message: &str) {
    let mut replies = self.replies.lock().unwrap();
    replies.insert(
      url.to_string(),
      VecDeque::from([Reply::Error(message.to_string())]),
    );
  }

  /// How many times a URL has been fetched.
  pub fn fetch_count(&self, url: &str) -> usize {
    self.log.lock().unwrap().iter().filter(|u| *u == url).count()
  }

  /// Total fetches across all URLs.
  pub fn total_fetches(&self) -> usize {
    self.log.lock().unwrap().len()
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    // Simulate the suspension point a real network fetch has.
    tokio::task::yield_now().await;

    self.log.lock().unwrap().push(request.url.clone());

    let mut replies = self.replies.lock().unwrap();
    let queue = match replies.get_mut(&request.url) {
      Some(queue) => queue,
      None => {
        return Ok(Response {
          status: 404,
          headers: HashMap::new(),
          body: Vec::new(),
        })
      }
    };

    let reply = if queue.len() > 1 {
      queue.pop_front()
    } else {
      None
    };
    let reply = match reply {
      Some(reply) => reply,
      None => match queue.front() {
        Some(Reply::Response(response)) => Reply::Response(response.clone()),
        Some(Reply::Error(message)) => Reply::Error(message.clone()),
        None => {
          return Ok(Response {
            status: 404,
            headers: HashMap::new(),
            body: Vec::new(),
          })
        }
      },
    };

    match reply {
      Reply::Response(response) => Ok(response),
      Reply::Error(message) => Err(eyre!("{}", message)),
    }
  }
}

/// Alert channel that records raises and clears.
#[derive(Default)]
pub struct RecordingAlerts {
  raised: Mutex<Vec<(AlertTag, String)>>,
  cleared: Mutex<Vec<AlertTag>>,
}

impl RecordingAlerts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn raised(&self) -> usize {
    self.raised.lock().unwrap().len()
  }

  pub fn cleared(&self) -> usize {
    self.cleared.lock().unwrap().len()
  }
}

impl AlertChannel for RecordingAlerts {
  fn raise(&self, tag: AlertTag, message: &str) {
    self.raised.lock().unwrap().push((tag, message.to_string()));
  }

  fn clear_all(&self, tag: AlertTag) {
    self.cleared.lock().unwrap().push(tag);
  }
}

/// Client surface that records navigation targets.
#[derive(Default)]
pub struct RecordingClients {
  navigations: Mutex<Vec<String>>,
}

impl RecordingClients {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn navigations(&self) -> Vec<String> {
    self.navigations.lock().unwrap().clone()
  }
}

impl ClientSurface for RecordingClients {
  fn navigate_all(&self, url: &str) {
    self.navigations.lock().unwrap().push(url.to_string());
  }
}
