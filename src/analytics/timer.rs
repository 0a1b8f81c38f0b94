//! Cancellable delayed task
//!
//! A `DelayedTask` runs a future once after a delay unless it is cancelled
//! first. Cancelling hands control back to the caller, which usually
//! performs the work immediately instead.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Outcome of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired,
    Cancelled,
}

pub struct DelayedTask {
    cancel_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<TimerOutcome>,
}

impl DelayedTask {
    /// Schedule `work` to run after `delay`
    pub fn schedule<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    work.await;
                    TimerOutcome::Fired
                }
                // Either an explicit cancel or the handle being dropped
                _ = cancel_rx => TimerOutcome::Cancelled,
            }
        });

        Self {
            cancel_tx: Some(cancel_tx),
            handle,
        }
    }

    /// Cancel the task if it has not fired yet.
    ///
    /// Returns `true` when the scheduled work will not run. If the work had
    /// already started it is allowed to finish and `false` is returned.
    pub async fn cancel(mut self) -> bool {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }

        match (&mut self.handle).await {
            Ok(outcome) => outcome == TimerOutcome::Cancelled,
            Err(_) => true,
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to fire or be cancelled
    #[cfg(test)]
    async fn join(mut self) -> TimerOutcome {
        // Dropping the sender would read as a cancel
        let _cancel_tx = self.cancel_tx.take();
        (&mut self.handle)
            .await
            .unwrap_or(TimerOutcome::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delayed_task_fires() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let task = DelayedTask::schedule(Duration::from_millis(20), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(task.is_finished());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delayed_task_join_waits_for_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let task = DelayedTask::schedule(Duration::from_millis(20), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(task.join().await, TimerOutcome::Fired);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delayed_task_cancel_before_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let task = DelayedTask::schedule(Duration::from_secs(10), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(task.cancel().await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delayed_task_cancel_after_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let task = DelayedTask::schedule(Duration::from_millis(10), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!task.cancel().await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
