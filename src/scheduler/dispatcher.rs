//! Bounded task dispatch shared by cycle checks and background port scans.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Spawns tasks that wait for one of a fixed number of permits before running.
#[derive(Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Dispatcher {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Spawn `task`; it starts once a permit is free and releases it when done,
    /// including when it panics.
    pub fn spawn<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            // The semaphore is never closed, so this only waits.
            let _permit = permits.acquire_owned().await.ok();
            task.await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dispatcher = Dispatcher::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                dispatcher.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_permit() {
        let dispatcher = Dispatcher::new(1);
        let handle = dispatcher.spawn(async {
            panic!("check blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());

        let value = dispatcher.spawn(async { 5 }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(Dispatcher::new(0).limit(), 1);
    }
}
