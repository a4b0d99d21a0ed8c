use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::warn;

/// Tracks detached work (observation pipelines, sink writes, health checks)
/// so shutdown can wait for it without any request ever waiting on it.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Closes the tracker and waits, bounded, for every tracked task.
    /// Returns `false` if the deadline hit first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            return true;
        }
        warn!(
            event = "background_drain_timeout",
            pending_at_start = pending,
            remaining = self.tracker.len(),
            timeout_secs = timeout.as_secs()
        );
        false
    }
}
