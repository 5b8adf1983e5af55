//! Interpreter backed by per-principal Livy sessions.

use std::sync::Arc;

use async_trait::async_trait;
use livy_core::{
    ExecutionResult, Interpreter, LivyConfig, OutputStore, RequestContext, SessionDirectory,
    SessionId, TransportError,
};
use livy_executor::{
    CancelRegistry, ExecError, PollPolicy, RequestHandle, StatementAssembler, StatementRunner,
};
use livy_transport::{LivyApi, SessionKind};

use crate::{MemoryDirectory, Scheduler, SessionError, SessionManager};

/// Interpretation error, before it is turned into an error result.
#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("Fail to create SQLContext,{0}")]
    SqlContext(String),
}

/// Runs code in the principal's remote session of one kind.
///
/// Requests are admitted through a FIFO scheduler. Multi-line input is
/// split into statements by the assembler and their output is streamed
/// into the caller's store.
pub struct LivyInterpreter<D = MemoryDirectory>
where
    D: SessionDirectory,
{
    sessions: SessionManager<D>,
    assembler: StatementAssembler,
    cancels: Arc<CancelRegistry>,
    scheduler: Scheduler,
}

impl LivyInterpreter<MemoryDirectory> {
    /// Interpreter talking HTTP to the configured server, with an in-memory directory.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(kind: SessionKind, config: &LivyConfig) -> Result<Self, TransportError> {
        Ok(Self::new(
            LivyApi::from_config(config)?,
            kind,
            MemoryDirectory::new(),
            config,
        ))
    }
}

impl<D> LivyInterpreter<D>
where
    D: SessionDirectory,
{
    #[must_use]
    pub fn new(api: LivyApi, kind: SessionKind, directory: D, config: &LivyConfig) -> Self {
        let runner = StatementRunner::new(api.clone(), PollPolicy::from_config(config));
        Self {
            sessions: SessionManager::new(api, kind, directory, config),
            assembler: StatementAssembler::new(runner, config.continuation),
            cancels: Arc::new(CancelRegistry::new()),
            scheduler: Scheduler::fifo(),
        }
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionManager<D> {
        &self.sessions
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn runner(&self) -> &StatementRunner {
        self.assembler.runner()
    }

    /// Register a request so `cancel` can find it.
    #[must_use]
    pub fn begin(&self, request_id: &str) -> RequestHandle {
        self.cancels.begin(request_id)
    }

    /// The principal's session.
    ///
    /// A session being created is always waited for and recorded, so a
    /// cancel during creation only takes effect once it is stored.
    pub(crate) async fn session_for(
        &self,
        principal: &str,
        handle: &RequestHandle,
    ) -> Result<SessionId, InterpretError> {
        let id = self.sessions.ensure_session(principal).await?;
        if handle.is_cancelled() {
            return Err(ExecError::Cancelled.into());
        }
        Ok(id)
    }

    /// Log `err`, drop a lost session, and build the error result.
    pub(crate) async fn failure(&self, principal: &str, err: InterpretError) -> ExecutionResult {
        match &err {
            InterpretError::Exec(ExecError::SessionLost(id)) => {
                tracing::warn!(session = id, principal, "session lost, it will be recreated");
                if let Err(e) = self.sessions.forget(principal, *id).await {
                    tracing::error!(principal, "Failed to forget session: {e}");
                }
            }
            InterpretError::Exec(ExecError::Cancelled) => {
                tracing::info!(principal, "request cancelled");
            }
            _ => tracing::error!(principal, "Interpretation failed: {err}"),
        }
        ExecutionResult::error(err.to_string())
    }

    async fn run(
        &self,
        code: &str,
        principal: &str,
        handle: &RequestHandle,
        out: &OutputStore,
    ) -> Result<ExecutionResult, InterpretError> {
        let session = self.session_for(principal, handle).await?;
        Ok(self.assembler.run(code, session, handle, out).await?)
    }
}

#[async_trait]
impl<D> Interpreter for LivyInterpreter<D>
where
    D: SessionDirectory,
{
    async fn interpret(
        &self,
        code: &str,
        ctx: &RequestContext,
        out: &OutputStore,
    ) -> ExecutionResult {
        out.clear();
        if code.trim().is_empty() {
            out.push_finished();
            return ExecutionResult::success("");
        }

        let handle = self.begin(&ctx.request_id);
        let result = self
            .scheduler
            .run(async {
                match self.run(code, &ctx.principal, &handle, out).await {
                    Ok(result) => result,
                    Err(e) => self.failure(&ctx.principal, e).await,
                }
            })
            .await;
        out.push_finished();
        result
    }

    async fn cancel(&self, request_id: &str) {
        let Some((session, statement)) = self.cancels.cancel(request_id) else {
            tracing::debug!(request_id, "no outstanding statement to cancel");
            return;
        };
        tracing::info!(request_id, session, statement, "cancelling statement");
        if let Err(e) = self.runner().api().cancel_statement(session, statement).await {
            tracing::warn!(session, statement, "Failed to cancel statement: {e}");
        }
    }

    async fn close(&self) {
        match self.sessions.close_all().await {
            Ok(closed) => tracing::info!(closed, kind = %self.sessions.kind(), "closed sessions"),
            Err(e) => tracing::error!("Failed to close sessions: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use livy_core::{Code, HttpMethod, OutputMsg, Reply, Transport};
    use livy_transport::{SESSION_NOT_FOUND, mock::ScriptedTransport};
    use serde_json::json;

    use super::*;

    fn interpreter(mock: &Arc<ScriptedTransport>) -> LivyInterpreter {
        let config = LivyConfig {
            poll_interval_ms: 1,
            ..LivyConfig::default()
        };
        let api = LivyApi::new(mock.base_url(), Arc::clone(mock) as Arc<dyn Transport>);
        LivyInterpreter::new(api, SessionKind::Spark, MemoryDirectory::new(), &config)
    }

    fn idle(id: u32) -> serde_json::Value {
        json!({"id": id, "state": "idle"})
    }

    fn ok(text: &str) -> serde_json::Value {
        json!({"id": 0, "state": "available", "output": {"status": "ok", "data": {"text/plain": text}}})
    }

    #[tokio::test]
    async fn test_interpret_creates_session_and_streams_output() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", idle(1));
        mock.on_json(HttpMethod::Post, "/sessions/1/statements", ok("x: Int = 1"));
        let interp = interpreter(&mock);
        let out = OutputStore::new();

        let result = interp
            .interpret("val x = 1", &RequestContext::new("alice", "p-1"), &out)
            .await;

        assert_eq!(result, ExecutionResult::success(""));
        assert_eq!(out.stdout_text(), "x: Int = 1\n");
        assert_eq!(out.get_history().last(), Some(&OutputMsg::Finished));
        assert!(interp.cancels.is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_does_not_create_session() {
        let mock = Arc::new(ScriptedTransport::new());
        let interp = interpreter(&mock);

        let result = interp
            .interpret("  \n ", &RequestContext::new("alice", "p-1"), &OutputStore::new())
            .await;

        assert_eq!(result, ExecutionResult::success(""));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_lost_session_is_recreated_on_next_call() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", idle(1))
            .on_json(HttpMethod::Post, "/sessions", idle(2));
        mock.on(
            HttpMethod::Post,
            "/sessions/1/statements",
            Reply::Ok(SESSION_NOT_FOUND.to_string()),
        );
        mock.on_json(HttpMethod::Post, "/sessions/2/statements", ok("1"));
        let interp = interpreter(&mock);
        let ctx = RequestContext::new("alice", "p-1");

        let lost = interp.interpret("1", &ctx, &OutputStore::new()).await;
        assert_eq!(lost.code, Code::Error);
        assert!(lost.message.contains("Session 1 not found"));
        assert_eq!(interp.sessions().session_of("alice").await.unwrap(), None);

        let retried = interp.interpret("1", &ctx, &OutputStore::new()).await;
        assert!(retried.is_success());
        assert_eq!(interp.sessions().session_of("alice").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_creation_failure_is_an_error_result() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on(HttpMethod::Post, "/sessions", Reply::Unavailable(503));
        let interp = interpreter(&mock);

        let result = interp
            .interpret("1", &RequestContext::new("alice", "p-1"), &OutputStore::new())
            .await;

        assert_eq!(result.code, Code::Error);
        assert!(result.message.starts_with("Failed to create spark session for alice"));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_statement() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", idle(1));
        mock.on_json(
            HttpMethod::Post,
            "/sessions/1/statements",
            json!({"id": 4, "state": "running", "output": null}),
        );
        mock.on_json(
            HttpMethod::Get,
            "/sessions/1/statements/4",
            json!({"id": 4, "state": "running", "output": null}),
        );
        mock.on_json(
            HttpMethod::Post,
            "/sessions/1/statements/4/cancel",
            json!({"msg": "canceled"}),
        );
        let interp = interpreter(&mock);
        let out = OutputStore::new();
        let ctx = RequestContext::new("alice", "p-1");

        let cancel = async {
            while interp.cancels.outstanding("p-1").is_none() {
                tokio::task::yield_now().await;
            }
            interp.cancel("p-1").await;
        };
        let (result, ()) = tokio::join!(interp.interpret("while (true) {}", &ctx, &out), cancel);

        assert_eq!(result, ExecutionResult::error("Statement was cancelled"));
        assert_eq!(mock.count(HttpMethod::Post, "/sessions/1/statements/4/cancel"), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_creation_keeps_the_session() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", json!({"id": 1, "state": "starting"}));
        for _ in 0..5 {
            mock.on_json(
                HttpMethod::Get,
                "/sessions/1",
                json!({"id": 1, "state": "starting"}),
            );
        }
        mock.on_json(HttpMethod::Get, "/sessions/1", idle(1));
        mock.on_json(HttpMethod::Post, "/sessions/1/statements", ok("2"));
        let interp = interpreter(&mock);
        let ctx = RequestContext::new("alice", "p-1");

        let cancel = async {
            while mock.count(HttpMethod::Get, "/sessions/1") == 0 {
                tokio::task::yield_now().await;
            }
            interp.cancel("p-1").await;
        };
        let out = OutputStore::new();
        let (cancelled, ()) = tokio::join!(interp.interpret("1 + 1", &ctx, &out), cancel);

        assert_eq!(cancelled, ExecutionResult::error("Statement was cancelled"));
        assert_eq!(interp.sessions().session_of("alice").await.unwrap(), Some(1));
        assert_eq!(mock.count(HttpMethod::Post, "/sessions/1/statements"), 0);

        let next = interp
            .interpret("1 + 1", &RequestContext::new("alice", "p-2"), &OutputStore::new())
            .await;
        assert!(next.is_success());
        assert_eq!(mock.count(HttpMethod::Post, "/sessions"), 1);
        assert_eq!(mock.count(HttpMethod::Delete, "/sessions/1"), 0);
    }

    #[tokio::test]
    async fn test_reused_store_is_cleared_when_creation_fails() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on(HttpMethod::Post, "/sessions", Reply::Unavailable(503));
        let interp = interpreter(&mock);
        let out = OutputStore::new();
        out.push_stdout("previous run\n");
        out.push_finished();

        let result = interp
            .interpret("1", &RequestContext::new("alice", "p-1"), &out)
            .await;

        assert_eq!(result.code, Code::Error);
        assert_eq!(out.get_history(), vec![OutputMsg::Cleared, OutputMsg::Finished]);
    }

    #[tokio::test]
    async fn test_cancel_unknown_request_is_a_no_op() {
        let mock = Arc::new(ScriptedTransport::new());
        interpreter(&mock).cancel("nope").await;
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_close_deletes_sessions() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", idle(1));
        mock.on_json(HttpMethod::Post, "/sessions/1/statements", ok(""));
        mock.on_json(HttpMethod::Delete, "/sessions/1", json!({"msg": "deleted"}));
        let interp = interpreter(&mock);
        interp
            .interpret("1", &RequestContext::new("alice", "p-1"), &OutputStore::new())
            .await;

        interp.close().await;

        assert_eq!(mock.count(HttpMethod::Delete, "/sessions/1"), 1);
        assert_eq!(interp.sessions().session_of("alice").await.unwrap(), None);
    }
}
