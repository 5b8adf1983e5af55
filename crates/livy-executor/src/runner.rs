//! Submit one statement and poll it until it is classified.

use std::time::Duration;

use livy_core::{ExecutionResult, LivyConfig, SessionId, StatementId};
use livy_transport::{ApiError, LivyApi, RemoteStatement, StatementState};
use thiserror::Error;
use tokio::time::Instant;

use crate::{RequestHandle, TableFormatError, classify, escape_code};

/// Execution error.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Api(ApiError),
    #[error("Session {0} not found, the Livy server may have restarted or lost the session")]
    SessionLost(SessionId),
    #[error("Statement was cancelled")]
    Cancelled,
    #[error("Statement did not finish within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Table(#[from] TableFormatError),
}

impl From<ApiError> for ExecError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::SessionNotFound(id) => Self::SessionLost(id),
            other => Self::Api(other),
        }
    }
}

/// How often and how long to poll a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the statement finishes or is cancelled.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    #[must_use]
    pub fn from_config(config: &LivyConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.statement_timeout(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&LivyConfig::default())
    }
}

/// Runs single statements on a session.
#[derive(Clone)]
pub struct StatementRunner {
    api: LivyApi,
    policy: PollPolicy,
}

impl StatementRunner {
    #[must_use]
    pub const fn new(api: LivyApi, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    #[must_use]
    pub const fn api(&self) -> &LivyApi {
        &self.api
    }

    /// Submit `code` to `session` and wait for its classified result.
    ///
    /// Blank code succeeds immediately without a round trip. While the
    /// statement is outstanding it is tracked on `handle`, and cancelling
    /// the handle's token stops the wait at once.
    ///
    /// # Errors
    /// Returns error if the session is lost, a request fails, the wait is
    /// cancelled or the statement outlives the poll timeout.
    pub async fn submit_and_wait(
        &self,
        code: &str,
        session: SessionId,
        handle: &RequestHandle,
    ) -> Result<ExecutionResult, ExecError> {
        let escaped = escape_code(code);
        if escaped.trim().is_empty() {
            return Ok(ExecutionResult::success(""));
        }
        if handle.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        let statement = self.api.submit_statement(session, &escaped).await?;
        tracing::debug!(session, statement = statement.id, state = ?statement.state, "submitted statement");

        handle.track(session, statement.id);
        let result = self.wait(session, statement, handle).await;
        handle.untrack();
        result
    }

    async fn wait(
        &self,
        session: SessionId,
        mut statement: RemoteStatement,
        handle: &RequestHandle,
    ) -> Result<ExecutionResult, ExecError> {
        let id = statement.id;
        let deadline = self.policy.timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(result) = classify(&statement) {
                return Ok(result);
            }
            if statement.state == StatementState::Cancelled {
                return Err(ExecError::Cancelled);
            }
            // Cancelled between submission and tracking: nobody else knows the id.
            if handle.is_cancelled() {
                self.cancel_remote(session, id).await;
                return Err(ExecError::Cancelled);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, self.policy.timeout) {
                if Instant::now() >= deadline {
                    tracing::warn!(session, statement = id, ?timeout, "statement timed out");
                    self.cancel_remote(session, id).await;
                    return Err(ExecError::Timeout(timeout));
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.policy.interval) => {}
                () = handle.token().cancelled() => return Err(ExecError::Cancelled),
            }

            statement = self.api.get_statement(session, id).await?;
            tracing::debug!(session, statement = id, state = ?statement.state, "polled statement");
        }
    }

    async fn cancel_remote(&self, session: SessionId, statement: StatementId) {
        if let Err(e) = self.api.cancel_statement(session, statement).await {
            tracing::warn!(session, statement, "Failed to cancel statement: {e}");
        }
    }
}
