//! In-memory session directory.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use livy_core::{DirectoryError, Principal, SessionDirectory, SessionId};

/// In-memory directory implementation.
///
/// Entries live as long as the process; the remote sessions they point
/// at are not closed on drop.
pub struct MemoryDirectory {
    sessions: RwLock<HashMap<Principal, SessionId>>,
}

impl MemoryDirectory {
    /// Create a new in-memory directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionDirectory for MemoryDirectory {
    async fn get(&self, principal: &str) -> Result<Option<SessionId>, DirectoryError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .get(principal)
            .copied())
    }

    async fn insert(&self, principal: &str, id: SessionId) -> Result<(), DirectoryError> {
        self.sessions
            .write()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .insert(principal.to_string(), id);
        Ok(())
    }

    async fn remove(&self, principal: &str) -> Result<Option<SessionId>, DirectoryError> {
        Ok(self
            .sessions
            .write()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .remove(principal))
    }

    async fn list(&self) -> Result<Vec<(Principal, SessionId)>, DirectoryError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| DirectoryError::Internal(e.to_string()))?
            .iter()
            .map(|(p, id)| (p.clone(), *id))
            .collect())
    }
}
