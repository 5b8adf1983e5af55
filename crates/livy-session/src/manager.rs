//! Session manager: one remote interpreter session per principal.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use livy_core::{DirectoryError, LivyConfig, SessionDirectory, SessionId};
use livy_transport::{ApiError, LivyApi, RemoteSession, SessionKind, SessionState};
use tokio::time::Instant;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to create {kind} session for {principal}: {source}")]
    Creation {
        kind: SessionKind,
        principal: String,
        #[source]
        source: ApiError,
    },
    #[error("Session {id} for {principal} ended in state {state:?} before becoming idle")]
    Failed {
        id: SessionId,
        principal: String,
        state: SessionState,
    },
    #[error("Session {id} for {principal} was not idle after {timeout:?}")]
    StartTimeout {
        id: SessionId,
        principal: String,
        timeout: Duration,
    },
    #[error("Failed to close session {id}: {source}")]
    Close {
        id: SessionId,
        #[source]
        source: ApiError,
    },
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Creates, tracks and closes remote sessions, one per principal.
///
/// Creation is serialized per principal, so concurrent first requests from
/// the same principal share one session while other principals proceed.
pub struct SessionManager<D>
where
    D: SessionDirectory,
{
    api: LivyApi,
    kind: SessionKind,
    directory: D,
    poll_interval: Duration,
    start_timeout: Duration,
    creation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<D> SessionManager<D>
where
    D: SessionDirectory,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(api: LivyApi, kind: SessionKind, directory: D, config: &LivyConfig) -> Self {
        Self {
            api,
            kind,
            directory,
            poll_interval: config.poll_interval(),
            start_timeout: config.session_start_timeout(),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    #[must_use]
    pub const fn api(&self) -> &LivyApi {
        &self.api
    }

    /// The session currently recorded for `principal`, if any.
    ///
    /// # Errors
    /// Returns error if the directory fails.
    pub async fn session_of(&self, principal: &str) -> Result<Option<SessionId>, SessionError> {
        Ok(self.directory.get(principal).await?)
    }

    /// Return the principal's session, creating it and waiting until it is
    /// idle if none is recorded.
    ///
    /// # Errors
    /// Returns error if creation fails, the session dies while starting or
    /// does not become idle within the start timeout.
    pub async fn ensure_session(&self, principal: &str) -> Result<SessionId, SessionError> {
        if let Some(id) = self.directory.get(principal).await? {
            return Ok(id);
        }

        let lock = self.creation_lock(principal);
        let _guard = lock.lock().await;

        // Another request may have finished creating while we waited.
        if let Some(id) = self.directory.get(principal).await? {
            return Ok(id);
        }

        let session = self
            .api
            .create_session(self.kind, principal)
            .await
            .map_err(|source| self.creation_error(principal, source))?;
        tracing::info!(session = session.id, principal, kind = %self.kind, "created session");

        let id = match self.wait_until_idle(principal, session).await {
            Ok(id) => id,
            Err(e) => {
                if let SessionError::StartTimeout { id, .. } = &e {
                    self.delete_remote(*id).await;
                }
                return Err(e);
            }
        };

        self.directory.insert(principal, id).await?;
        Ok(id)
    }

    /// Drop the principal's entry if it still points at `lost`, without
    /// contacting the server. The next request creates a fresh session.
    ///
    /// # Errors
    /// Returns error if the directory fails.
    pub async fn forget(&self, principal: &str, lost: SessionId) -> Result<bool, SessionError> {
        let lock = self.creation_lock(principal);
        let _guard = lock.lock().await;

        if self.directory.get(principal).await? != Some(lost) {
            return Ok(false);
        }
        self.directory.remove(principal).await?;
        tracing::warn!(session = lost, principal, "forgot lost session");
        Ok(true)
    }

    /// Close the principal's session, if any, on the server.
    ///
    /// # Errors
    /// Returns error if the directory fails or the server refuses the delete.
    pub async fn close_session(&self, principal: &str) -> Result<Option<SessionId>, SessionError> {
        let lock = self.creation_lock(principal);
        let _guard = lock.lock().await;

        let Some(id) = self.directory.remove(principal).await? else {
            return Ok(None);
        };
        self.api
            .delete_session(id)
            .await
            .map_err(|source| SessionError::Close { id, source })?;
        tracing::info!(session = id, principal, "closed session");
        Ok(Some(id))
    }

    /// Close every recorded session. Failures are logged and skipped.
    ///
    /// # Errors
    /// Returns error if the directory cannot be listed.
    pub async fn close_all(&self) -> Result<usize, SessionError> {
        let mut closed = 0;
        for (principal, _) in self.directory.list().await? {
            match self.close_session(&principal).await {
                Ok(Some(_)) => closed += 1,
                Ok(None) => {}
                Err(e) => tracing::error!(principal, "Failed to close session: {e}"),
            }
        }
        Ok(closed)
    }

    async fn wait_until_idle(
        &self,
        principal: &str,
        mut session: RemoteSession,
    ) -> Result<SessionId, SessionError> {
        let deadline = Instant::now() + self.start_timeout;

        while !session.state.is_ready() {
            if session.state.is_terminal() {
                return Err(SessionError::Failed {
                    id: session.id,
                    principal: principal.to_string(),
                    state: session.state,
                });
            }
            if Instant::now() >= deadline {
                return Err(SessionError::StartTimeout {
                    id: session.id,
                    principal: principal.to_string(),
                    timeout: self.start_timeout,
                });
            }
            tracing::debug!(session = session.id, state = ?session.state, "waiting for session to become idle");
            tokio::time::sleep(self.poll_interval).await;

            session = self
                .api
                .get_session(session.id)
                .await
                .map_err(|source| self.creation_error(principal, source))?;
        }

        Ok(session.id)
    }

    async fn delete_remote(&self, id: SessionId) {
        if let Err(e) = self.api.delete_session(id).await {
            tracing::warn!(session = id, "Failed to delete session: {e}");
        }
    }

    fn creation_error(&self, principal: &str, source: ApiError) -> SessionError {
        SessionError::Creation {
            kind: self.kind,
            principal: principal.to_string(),
            source,
        }
    }

    fn creation_lock(&self, principal: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.creation_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(principal.to_string())
                .or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use livy_core::{HttpMethod, Transport};
    use livy_transport::mock::ScriptedTransport;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::MemoryDirectory;

    fn config(start_timeout_ms: u64) -> LivyConfig {
        LivyConfig {
            poll_interval_ms: 1,
            session_start_timeout_ms: start_timeout_ms,
            ..LivyConfig::default()
        }
    }

    fn manager(mock: &Arc<ScriptedTransport>, cfg: &LivyConfig) -> SessionManager<MemoryDirectory> {
        let api = LivyApi::new(mock.base_url(), Arc::clone(mock) as Arc<dyn Transport>);
        SessionManager::new(api, SessionKind::Spark, MemoryDirectory::new(), cfg)
    }

    fn session(id: u32, state: &str) -> serde_json::Value {
        json!({"id": id, "state": state, "kind": "spark"})
    }

    #[tokio::test]
    async fn test_ensure_session_is_idempotent() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(4, "idle"));
        let mgr = manager(&mock, &config(1000));

        assert_eq!(assert_ok!(mgr.ensure_session("alice").await), 4);
        assert_eq!(assert_ok!(mgr.ensure_session("alice").await), 4);
        assert_eq!(mock.count(HttpMethod::Post, "/sessions"), 1);

        let body: serde_json::Value =
            serde_json::from_str(&mock.bodies(HttpMethod::Post, "/sessions")[0]).unwrap();
        assert_eq!(body, json!({"kind": "spark", "proxyUser": "alice"}));
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_create_one_session() {
        let mock = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(10)));
        mock.on_json(HttpMethod::Post, "/sessions", session(1, "starting"));
        mock.on_json(HttpMethod::Get, "/sessions/1", session(1, "idle"));
        let mgr = manager(&mock, &config(1000));

        let (a, b, c) = tokio::join!(
            mgr.ensure_session("alice"),
            mgr.ensure_session("alice"),
            mgr.ensure_session("alice"),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
        assert_eq!(mock.count(HttpMethod::Post, "/sessions"), 1);
    }

    #[tokio::test]
    async fn test_waits_until_idle() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(2, "not_started"));
        mock.on_json(HttpMethod::Get, "/sessions/2", session(2, "starting"))
            .on_json(HttpMethod::Get, "/sessions/2", session(2, "idle"));
        let mgr = manager(&mock, &config(1000));

        assert_eq!(mgr.ensure_session("bob").await.unwrap(), 2);
        assert_eq!(mock.count(HttpMethod::Get, "/sessions/2"), 2);
        assert_eq!(mgr.session_of("bob").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_dead_session_fails_creation() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(3, "starting"));
        mock.on_json(HttpMethod::Get, "/sessions/3", session(3, "dead"));
        let mgr = manager(&mock, &config(1000));

        let err = mgr.ensure_session("carol").await.unwrap_err();
        assert!(matches!(err, SessionError::Failed { id: 3, state: SessionState::Dead, .. }));
        assert_eq!(mgr.session_of("carol").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_start_timeout_deletes_session() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(5, "starting"));
        mock.on_json(HttpMethod::Get, "/sessions/5", session(5, "starting"));
        mock.on_json(HttpMethod::Delete, "/sessions/5", json!({"msg": "deleted"}));
        let mgr = manager(&mock, &config(20));

        let err = mgr.ensure_session("dave").await.unwrap_err();
        assert!(matches!(err, SessionError::StartTimeout { id: 5, .. }));
        assert_eq!(mock.count(HttpMethod::Delete, "/sessions/5"), 1);
    }

    #[tokio::test]
    async fn test_creation_failure() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on(HttpMethod::Post, "/sessions", livy_core::Reply::Unavailable(500));
        let mgr = manager(&mock, &config(1000));

        let err = assert_err!(mgr.ensure_session("erin").await);
        assert!(matches!(err, SessionError::Creation { .. }));
    }

    #[tokio::test]
    async fn test_forget_only_drops_matching_session() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(6, "idle"));
        let mgr = manager(&mock, &config(1000));
        mgr.ensure_session("frank").await.unwrap();

        assert!(!mgr.forget("frank", 99).await.unwrap());
        assert_eq!(mgr.session_of("frank").await.unwrap(), Some(6));

        assert!(mgr.forget("frank", 6).await.unwrap());
        assert_eq!(mgr.session_of("frank").await.unwrap(), None);
        assert!(mock.requests().iter().all(|r| r.method != HttpMethod::Delete));
    }

    #[tokio::test]
    async fn test_close_all() {
        let mock = Arc::new(ScriptedTransport::new());
        mock.on_json(HttpMethod::Post, "/sessions", session(7, "idle"))
            .on_json(HttpMethod::Post, "/sessions", session(8, "idle"));
        mock.on_json(HttpMethod::Delete, "/sessions/7", json!({"msg": "deleted"}));
        mock.on(
            HttpMethod::Delete,
            "/sessions/8",
            livy_core::Reply::NotFound("gone".to_string()),
        );
        let mgr = manager(&mock, &config(1000));
        mgr.ensure_session("a").await.unwrap();
        mgr.ensure_session("b").await.unwrap();

        assert_eq!(mgr.close_all().await.unwrap(), 2);
        assert_eq!(mgr.session_of("a").await.unwrap(), None);
        assert_eq!(mgr.close_session("a").await.unwrap(), None);
    }
}
