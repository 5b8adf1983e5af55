//! Typed calls against the Livy REST API.

use std::sync::Arc;

use livy_core::{
    HttpMethod, LivyConfig, Reply, SessionId, StatementId, Transport, TransportError,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    HttpTransport,
    protocol::{
        CreateSessionRequest, RemoteSession, RemoteStatement, SESSION_NOT_FOUND, SessionKind,
        statement_body,
    },
};

/// API error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Session {0} not found, the Livy server may have restarted or lost the session")]
    SessionNotFound(SessionId),
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: HttpMethod,
        url: String,
        status: u16,
    },
    #[error("Malformed {what} payload: {source}")]
    Malformed {
        what: &'static str,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed client for one Livy server.
///
/// Every call maps a 404 (or the "Session not found" body) on a
/// session-scoped path to `ApiError::SessionNotFound`, so callers can
/// tell a lost session apart from other failures without string checks.
#[derive(Clone)]
pub struct LivyApi {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl LivyApi {
    /// Create a client over any transport.
    #[must_use]
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    /// Create a client over HTTP using the configured URL and timeouts.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &LivyConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(config.base_url(), Arc::new(transport)))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /sessions` on behalf of `proxy_user`.
    ///
    /// # Errors
    /// Returns error if the request fails or the reply does not parse.
    pub async fn create_session(
        &self,
        kind: SessionKind,
        proxy_user: &str,
    ) -> Result<RemoteSession, ApiError> {
        let body = serde_json::to_string(&CreateSessionRequest { kind, proxy_user }).map_err(
            |source| ApiError::Malformed {
                what: "session request",
                body: String::new(),
                source,
            },
        )?;
        let reply = self
            .request(HttpMethod::Post, "/sessions".to_string(), Some(body), None)
            .await?;
        decode("session", reply)
    }

    /// `GET /sessions/{id}`.
    ///
    /// # Errors
    /// Returns error if the request fails, the session is unknown or the reply does not parse.
    pub async fn get_session(&self, id: SessionId) -> Result<RemoteSession, ApiError> {
        let reply = self
            .request(HttpMethod::Get, format!("/sessions/{id}"), None, Some(id))
            .await?;
        decode("session", reply)
    }

    /// `DELETE /sessions/{id}`; an already unknown session counts as deleted.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), ApiError> {
        match self
            .request(HttpMethod::Delete, format!("/sessions/{id}"), None, Some(id))
            .await
        {
            Ok(_) | Err(ApiError::SessionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// `POST /sessions/{id}/statements` with code that is already escaped
    /// for embedding in a JSON string.
    ///
    /// # Errors
    /// Returns error if the request fails, the session is lost or the reply does not parse.
    pub async fn submit_statement(
        &self,
        session: SessionId,
        escaped_code: &str,
    ) -> Result<RemoteStatement, ApiError> {
        let reply = self
            .request(
                HttpMethod::Post,
                format!("/sessions/{session}/statements"),
                Some(statement_body(escaped_code)),
                Some(session),
            )
            .await?;
        decode("statement", reply)
    }

    /// `GET /sessions/{id}/statements/{stmt}`.
    ///
    /// # Errors
    /// Returns error if the request fails, the session is lost or the reply does not parse.
    pub async fn get_statement(
        &self,
        session: SessionId,
        statement: StatementId,
    ) -> Result<RemoteStatement, ApiError> {
        let reply = self
            .request(
                HttpMethod::Get,
                format!("/sessions/{session}/statements/{statement}"),
                None,
                Some(session),
            )
            .await?;
        decode("statement", reply)
    }

    /// `POST /sessions/{id}/statements/{stmt}/cancel`.
    ///
    /// # Errors
    /// Returns error if the request fails or the session is lost.
    pub async fn cancel_statement(
        &self,
        session: SessionId,
        statement: StatementId,
    ) -> Result<(), ApiError> {
        self.request(
            HttpMethod::Post,
            format!("/sessions/{session}/statements/{statement}/cancel"),
            None,
            Some(session),
        )
        .await
        .map(|_| ())
    }

    async fn request(
        &self,
        method: HttpMethod,
        path: String,
        body: Option<String>,
        session: Option<SessionId>,
    ) -> Result<String, ApiError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%method, %url, "livy request");

        match (self.transport.send(method, &url, body).await?, session) {
            (Reply::Ok(body), Some(id)) if body.trim() == SESSION_NOT_FOUND => {
                Err(ApiError::SessionNotFound(id))
            }
            (Reply::Ok(body), _) => Ok(body),
            (Reply::NotFound(_), Some(id)) => Err(ApiError::SessionNotFound(id)),
            (Reply::NotFound(_), None) => Err(ApiError::Status {
                method,
                url,
                status: 404,
            }),
            (Reply::Unavailable(status), _) => Err(ApiError::Status {
                method,
                url,
                status,
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(what: &'static str, body: String) -> Result<T, ApiError> {
    serde_json::from_str(&body).map_err(|source| ApiError::Malformed { what, body, source })
}
