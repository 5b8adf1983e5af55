//! reqwest-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use livy_core::{HttpMethod, LivyConfig, Reply, Transport, TransportError};
use reqwest::header::{CONTENT_TYPE, HeaderValue};

/// Transport that talks HTTP to a Livy server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `request_timeout`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a transport from the configured request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &LivyConfig) -> Result<Self, TransportError> {
        Self::new(config.request_timeout())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<String>,
    ) -> Result<Reply, TransportError> {
        let mut request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Delete => self.client.delete(url),
        }
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        if !matches!(status, 200 | 201 | 404) {
            tracing::warn!(%method, url, status, "livy request returned no usable body");
            return Ok(Reply::Unavailable(status));
        }

        let text = response.text().await.map_err(|e| TransportError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(if status == 404 {
            Reply::NotFound(text)
        } else {
            Reply::Ok(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).expect("client should build")
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/sessions")
                    .header("content-type", "application/json")
                    .json_body(json!({"kind": "spark", "proxyUser": "alice"}));
                then.status(201).body(r#"{"id": 0, "state": "starting"}"#);
            })
            .await;

        let reply = transport()
            .send(
                HttpMethod::Post,
                &server.url("/sessions"),
                Some(r#"{"kind": "spark", "proxyUser": "alice"}"#.to_string()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply, Reply::Ok(r#"{"id": 0, "state": "starting"}"#.to_string()));
    }

    #[tokio::test]
    async fn test_404_keeps_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sessions/3/statements/1");
                then.status(404).body("Session not found");
            })
            .await;

        let reply = transport()
            .send(HttpMethod::Get, &server.url("/sessions/3/statements/1"), None)
            .await
            .unwrap();

        assert_eq!(reply, Reply::NotFound("Session not found".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_has_no_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/sessions/3");
                then.status(500).body("stack trace");
            })
            .await;

        let reply = transport()
            .send(HttpMethod::Delete, &server.url("/sessions/3"), None)
            .await
            .unwrap();

        assert_eq!(reply, Reply::Unavailable(500));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let err = transport()
            .send(HttpMethod::Get, "http://127.0.0.1:9/sessions/1", None)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Request { .. }));
    }
}
