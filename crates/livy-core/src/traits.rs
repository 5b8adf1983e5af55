//! Core traits for transport, session directory and interpreters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ExecutionResult, OutputStore, RequestContext};

/// Identity under which a remote session is created and addressed.
pub type Principal = String;

/// Remote session identifier assigned by Livy.
pub type SessionId = u32;

/// Remote statement identifier, unique within its session.
pub type StatementId = u32;

/// HTTP verbs the Livy API is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What came back from the remote service.
///
/// Only 200, 201 and 404 carry a body worth reading; every other status
/// is reported without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 200 or 201 with the raw body.
    Ok(String),
    /// 404 with the raw body (Livy answers unknown sessions this way).
    NotFound(String),
    /// Any other status; the body is not read.
    Unavailable(u16),
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Trait for sending requests to the Livy server.
///
/// Implementations own connection handling; callers only see status and body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `body` (raw JSON text) to `url` and return the reply.
    async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<String>,
    ) -> Result<Reply, TransportError>;
}

/// Session directory error.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory error: {0}")]
    Internal(String),
}

/// Trait for principal → remote session directories.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Look up the session of a principal.
    async fn get(&self, principal: &str) -> Result<Option<SessionId>, DirectoryError>;

    /// Record the session of a principal, replacing any previous entry.
    async fn insert(&self, principal: &str, id: SessionId) -> Result<(), DirectoryError>;

    /// Remove the entry of a principal, returning the session it pointed at.
    async fn remove(&self, principal: &str) -> Result<Option<SessionId>, DirectoryError>;

    /// All entries, in no particular order.
    async fn list(&self) -> Result<Vec<(Principal, SessionId)>, DirectoryError>;
}

/// Trait for interpreters hosted by a notebook-style front end.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Run `code` on behalf of `ctx.principal`, streaming output into `out`.
    ///
    /// Failures never escape as `Err`; they come back as an error result.
    async fn interpret(&self, code: &str, ctx: &RequestContext, out: &OutputStore)
    -> ExecutionResult;

    /// Cancel the statement currently running for `request_id`, if any.
    async fn cancel(&self, request_id: &str);

    /// Close every remote session this interpreter opened.
    async fn close(&self);
}
