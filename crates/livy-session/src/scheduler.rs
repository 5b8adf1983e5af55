//! Execution scheduling for interpreter requests.

use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

/// Bounds how many requests run at once.
///
/// Waiters are admitted in arrival order, so a scheduler of one is a FIFO
/// queue. Clones share the same permits.
#[derive(Clone)]
pub struct Scheduler {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl Scheduler {
    /// One request at a time, in arrival order.
    #[must_use]
    pub fn fifo() -> Self {
        Self::parallel(1)
    }

    /// Up to `max_concurrency` requests at once (at least one).
    #[must_use]
    pub fn parallel(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `task` once a slot is free.
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();
        task.await
    }
}
