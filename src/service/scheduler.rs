use std::time::Duration;

use tokio::{runtime::Handle, sync::watch};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback once after a delay, there is no way to cancel a single task
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task);

    /// Drops every task that has not fired yet
    fn shutdown(&self);
}

/// Scheduler backed by tokio timers
pub struct TokioScheduler {
    handle: Handle,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        TokioScheduler {
            handle,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Scheduler on the runtime of the calling task
    pub fn current() -> Self {
        TokioScheduler::new(Handle::current())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        if self.is_shutdown() {
            debug!("Scheduler is shut down, dropping task");
            return;
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        let cancelled = self.shutdown_rx.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if !*cancelled.borrow() {
                        task();
                    }
                }
                _ = shutdown_rx.changed() => {
                    trace!("Scheduled task cancelled by shutdown");
                }
            }
        });
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn runs_task_after_delay() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));
        let local_fired = fired.clone();

        scheduler.schedule(
            Duration::from_millis(50),
            Box::new(move || {
                local_fired.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_tasks() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let local_fired = fired.clone();
            scheduler.schedule(
                Duration::from_millis(50),
                Box::new(move || {
                    local_fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        scheduler.shutdown();
        assert!(scheduler.is_shutdown());

        let local_fired = fired.clone();
        scheduler.schedule(
            Duration::from_millis(1),
            Box::new(move || {
                local_fired.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
