//! Scripted in-memory transport for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use livy_core::{HttpMethod, Reply, Transport, TransportError};

const BASE_URL: &str = "http://livy.test";

/// A request the transport has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<String>,
}

/// Transport answering from per-route reply queues.
///
/// Replies for a route are handed out in order; the last one repeats
/// forever so a statement can be left "running" until cancelled.
/// Unscripted routes fail with a transport error.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Option<Duration>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Delay every reply, to widen race windows in concurrency tests.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Base URL to build the API under test with.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        BASE_URL
    }

    /// Queue a reply for `method path`.
    pub fn on(&self, method: HttpMethod, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a 200 reply carrying `value` as JSON.
    pub fn on_json(&self, method: HttpMethod, path: &str, value: serde_json::Value) -> &Self {
        self.on(method, path, Reply::Ok(value.to_string()))
    }

    /// Every request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests seen for `method path`.
    #[must_use]
    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Bodies sent to `method path`, in order.
    #[must_use]
    pub fn bodies(&self, method: HttpMethod, path: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .filter_map(|r| r.body)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<String>,
    ) -> Result<Reply, TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let path = url.strip_prefix(BASE_URL).unwrap_or(url).to_string();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method,
                path: path.clone(),
                body,
            });

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes
            .get_mut(&(method, path))
            .filter(|q| !q.is_empty())
            .ok_or_else(|| TransportError::Request {
                url: url.to_string(),
                message: "no scripted reply".to_string(),
            })?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or(Reply::Unavailable(500)))
        } else {
            Ok(queue[0].clone())
        }
    }
}
