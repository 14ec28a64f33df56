use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;

/// Bounds how many jobs run at once; callers wait their turn.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    semaphore: Arc<Semaphore>,
}

impl InProcessQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn run<F>(&self, fut: F) -> anyhow::Result<F::Output>
    where
        F: Future,
    {
        if self.semaphore.available_permits() == 0 {
            tracing::debug!("job queued");
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("in-process queue semaphore is closed")?;
        Ok(fut.await)
    }
}
