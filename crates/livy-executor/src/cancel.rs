//! In-flight statements per request, for cancellation.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use livy_core::{SessionId, StatementId};
use tokio_util::sync::CancellationToken;

struct InFlight {
    generation: u64,
    token: CancellationToken,
    statement: Option<(SessionId, StatementId)>,
}

/// Registry of running requests.
///
/// Each request registers under its request id for as long as its
/// `RequestHandle` lives. While a statement is outstanding the entry
/// records which one, so a cancel targets exactly that statement.
#[derive(Default)]
pub struct CancelRegistry {
    entries: Mutex<HashMap<String, InFlight>>,
    next_generation: AtomicU64,
}

impl CancelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. A newer request with the same id replaces the older one.
    #[must_use]
    pub fn begin(self: &Arc<Self>, request_id: &str) -> RequestHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.lock().insert(
            request_id.to_string(),
            InFlight {
                generation,
                token: token.clone(),
                statement: None,
            },
        );
        RequestHandle {
            registry: Some(Arc::clone(self)),
            request_id: request_id.to_string(),
            generation,
            token,
        }
    }

    /// Fire the request's token and return the statement it is waiting on.
    ///
    /// Returns `None` if the request is unknown or has nothing outstanding.
    pub fn cancel(&self, request_id: &str) -> Option<(SessionId, StatementId)> {
        let entries = self.lock();
        let entry = entries.get(request_id)?;
        entry.token.cancel();
        entry.statement
    }

    /// The statement a request is currently waiting on.
    #[must_use]
    pub fn outstanding(&self, request_id: &str) -> Option<(SessionId, StatementId)> {
        self.lock().get(request_id).and_then(|e| e.statement)
    }

    /// Number of registered requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_statement(
        &self,
        request_id: &str,
        generation: u64,
        statement: Option<(SessionId, StatementId)>,
    ) {
        if let Some(entry) = self.lock().get_mut(request_id) {
            if entry.generation == generation {
                entry.statement = statement;
            }
        }
    }

    fn finish(&self, request_id: &str, generation: u64) {
        let mut entries = self.lock();
        if entries
            .get(request_id)
            .is_some_and(|e| e.generation == generation)
        {
            entries.remove(request_id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered request. Dropping it unregisters the request.
pub struct RequestHandle {
    registry: Option<Arc<CancelRegistry>>,
    request_id: String,
    generation: u64,
    token: CancellationToken,
}

impl RequestHandle {
    /// A handle that is not registered anywhere and is only cancelled through its token.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            registry: None,
            request_id: String::new(),
            generation: 0,
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Record the statement this request now waits on.
    pub fn track(&self, session: SessionId, statement: StatementId) {
        if let Some(registry) = &self.registry {
            registry.set_statement(&self.request_id, self.generation, Some((session, statement)));
        }
    }

    /// The outstanding statement has reached a terminal state.
    pub fn untrack(&self) {
        if let Some(registry) = &self.registry {
            registry.set_statement(&self.request_id, self.generation, None);
        }
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.finish(&self.request_id, self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_returns_outstanding_statement() {
        let registry = Arc::new(CancelRegistry::new());
        let handle = registry.begin("p-1");
        assert_eq!(registry.cancel("p-1"), None);
        assert!(handle.is_cancelled());

        let handle = registry.begin("p-2");
        handle.track(3, 7);
        assert_eq!(registry.outstanding("p-2"), Some((3, 7)));
        assert_eq!(registry.cancel("p-2"), Some((3, 7)));
        assert!(handle.is_cancelled());

        handle.untrack();
        assert_eq!(registry.outstanding("p-2"), None);
    }

    #[test]
    fn test_unknown_request() {
        let registry = CancelRegistry::new();
        assert_eq!(registry.cancel("nope"), None);
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = Arc::new(CancelRegistry::new());
        {
            let _handle = registry.begin("p-1");
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_remove_newer_request() {
        let registry = Arc::new(CancelRegistry::new());
        let old = registry.begin("p-1");
        let new = registry.begin("p-1");

        old.track(1, 1);
        drop(old);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.outstanding("p-1"), None);

        new.track(1, 2);
        assert_eq!(registry.cancel("p-1"), Some((1, 2)));
        assert!(new.is_cancelled());
    }

    #[test]
    fn test_detached_handle() {
        let handle = RequestHandle::detached();
        handle.track(1, 1);
        assert!(!handle.is_cancelled());
        handle.token().cancel();
        assert!(handle.is_cancelled());
    }
}
