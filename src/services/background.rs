//! Bounded background task execution
//!
//! Work that must not delay a reply (sending invitations, for instance) is
//! submitted here. A single scheduling loop starts queued tasks in FIFO
//! order while fewer than `max_concurrent_tasks` are running. `close`
//! stops scheduling, gives running tasks a grace period, cancels whatever
//! is left and discards tasks that never started.
//!
//! ```text
//! Idle --run--> Working --close--> Draining --> Closed
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::BackgroundConfig;

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Lifecycle of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Working,
    Draining,
    Closed,
}

struct PendingTask {
    name: String,
    future: TaskFuture,
}

struct Inner {
    max_concurrent: usize,
    grace: Duration,
    pending: Mutex<VecDeque<PendingTask>>,
    available: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    state: watch::Sender<ManagerState>,
    running: tokio::sync::Mutex<JoinSet<()>>,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, VecDeque<PendingTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, from: ManagerState, to: ManagerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

/// Cheap to clone; all clones drive the same queue
#[derive(Clone)]
pub struct BackgroundTaskManager {
    inner: Arc<Inner>,
}

impl BackgroundTaskManager {
    pub fn new(config: &BackgroundConfig) -> Self {
        Self::with_limits(config.max_concurrent_tasks, config.shutdown_grace())
    }

    pub fn with_limits(max_concurrent: usize, grace: Duration) -> Self {
        let (available, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(ManagerState::Idle);

        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                grace,
                pending: Mutex::new(VecDeque::new()),
                available,
                shutdown,
                state,
                running: tokio::sync::Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.inner.state.borrow()
    }

    /// Tasks waiting for a slot
    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// Queue a task. Never blocks; tasks submitted once draining has begun are dropped.
    pub fn submit<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if matches!(self.state(), ManagerState::Draining | ManagerState::Closed) {
            warn!(task = %name, "Background manager is shutting down, task discarded");
            return;
        }

        let mut pending = self.inner.pending();
        pending.push_back(PendingTask {
            name: name.clone(),
            future: Box::pin(future),
        });
        self.inner.available.send_replace(true);
        debug!(task = %name, queued = pending.len(), "Background task submitted");
    }

    /// Scheduling loop. Returns once `close` has been requested.
    pub async fn run(&self) {
        let inner = &self.inner;
        if !inner.transition(ManagerState::Idle, ManagerState::Working) {
            warn!(state = ?self.state(), "Background manager already started");
            return;
        }

        let max = inner.max_concurrent;
        let mut available = inner.available.subscribe();
        let mut shutdown = inner.shutdown.subscribe();
        let mut running = inner.running.lock().await;
        info!(max_concurrent = max, "Background task manager working");

        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }
            let ready = *available.borrow_and_update() && running.len() < max;

            tokio::select! {
                biased;
                _ = shutdown.changed() => {}
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join_error(joined);
                    if !inner.pending().is_empty() {
                        inner.available.send_replace(true);
                    }
                }
                _ = std::future::ready(()), if ready => {
                    let mut pending = inner.pending();
                    if let Some(task) = pending.pop_front() {
                        running.spawn(execute(task));
                    }
                    if running.len() >= max || pending.is_empty() {
                        inner.available.send_replace(false);
                    }
                }
                _ = available.changed() => {}
            }
        }

        inner.state.send_replace(ManagerState::Draining);
        info!(running = running.len(), "Background task manager stopped scheduling");
    }

    /// Stop scheduling and drain. Running tasks get `shutdown_grace`, then are cancelled.
    pub async fn close(&self) {
        let inner = &self.inner;
        let started = Instant::now();
        inner.shutdown.send_replace(true);

        // Held by `run` until its loop exits
        let mut running = inner.running.lock().await;
        inner.state.send_replace(ManagerState::Draining);

        let discarded = {
            let mut pending = inner.pending();
            let count = pending.len();
            pending.clear();
            count
        };
        if discarded > 0 {
            warn!(discarded = discarded, "Discarding background tasks that never started");
        }

        let grace = inner.grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = running.join_next().await {
                log_join_error(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = running.len(),
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, cancelling background tasks"
            );
            running.shutdown().await;
        }

        inner.state.send_replace(ManagerState::Closed);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Background task manager closed"
        );
    }
}

async fn execute(task: PendingTask) {
    let PendingTask { name, future } = task;
    let started = Instant::now();

    match future.await {
        Ok(()) => debug!(
            task = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Background task finished"
        ),
        Err(e) => error!(task = %name, error = %e, "Background task failed"),
    }
}

fn log_join_error(joined: Result<(), JoinError>) {
    match joined {
        Err(e) if e.is_panic() => error!(error = %e, "Background task panicked"),
        Err(e) => debug!(error = %e, "Background task cancelled"),
        Ok(()) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    async fn explode() -> anyhow::Result<()> {
        panic!("task panic")
    }

    #[test]
    fn limits_come_from_config() {
        let manager = BackgroundTaskManager::new(&BackgroundConfig {
            max_concurrent_tasks: 0,
            shutdown_grace_seconds: 5,
        });
        assert_eq!(manager.inner.max_concurrent, 1);
        assert_eq!(manager.inner.grace, Duration::from_secs(5));
        assert_eq!(manager.state(), ManagerState::Idle);
    }

    fn manager(max_concurrent: usize, grace_ms: u64) -> BackgroundTaskManager {
        BackgroundTaskManager::with_limits(max_concurrent, Duration::from_millis(grace_ms))
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_bound_and_starts_in_order() {
        let manager = manager(2, 1000);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let (current, peak, finished, order) =
                (current.clone(), peak.clone(), finished.clone(), order.clone());
            manager.submit(format!("task-{}", i), async move {
                order.lock().unwrap().push(i);
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let runner = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run().await }
        });

        wait_until(|| finished.load(Ordering::SeqCst) == 5).await;
        manager.close().await;
        runner.await.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(manager.state(), ManagerState::Closed);
    }

    #[tokio::test]
    async fn failing_and_panicking_tasks_only_free_their_slot() {
        let manager = manager(1, 1000);
        let finished = Arc::new(AtomicBool::new(false));

        manager.submit("fails", async { Err(anyhow::anyhow!("boom")) });
        manager.submit("panics", explode());
        {
            let finished = finished.clone();
            manager.submit("succeeds", async move {
                finished.store(true, Ordering::SeqCst);
                Ok(())
            });
        }

        let runner = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run().await }
        });

        wait_until(|| finished.load(Ordering::SeqCst)).await;
        manager.close().await;
        runner.await.unwrap();
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn close_cancels_tasks_after_grace_period() {
        let manager = manager(1, 100);
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let never_started = Arc::new(AtomicBool::new(false));

        {
            let (started, dropped) = (started.clone(), dropped.clone());
            manager.submit("slow", async move {
                let _guard = SetOnDrop(dropped);
                started.notify_one();
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            });
        }
        {
            let never_started = never_started.clone();
            manager.submit("queued", async move {
                never_started.store(true, Ordering::SeqCst);
                Ok(())
            });
        }

        let runner = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run().await }
        });
        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .unwrap();

        let begin = Instant::now();
        manager.close().await;
        runner.await.unwrap();

        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!never_started.load(Ordering::SeqCst));
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(manager.state(), ManagerState::Closed);
    }

    #[tokio::test]
    async fn submissions_after_close_are_discarded() {
        let manager = manager(1, 10);
        manager.close().await;
        manager.submit("late", async { Ok(()) });

        assert_eq!(manager.pending_count(), 0);
        manager.run().await;
        assert_eq!(manager.state(), ManagerState::Closed);
    }
}
