//! Keyed background tasks. Starting a task under a key that is already
//! running aborts the old one first, so there is never more than one task
//! per subscription.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::catalog::WindowId;

/// Everything the session keeps a timer or stream for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    NotificationStream,
    ProactivePoller,
    BehaviorPoller,
    /// A timer that lives exactly as long as the window.
    Window(WindowId, &'static str),
    ImageSubmit(u64),
    ImageJob(String),
}

impl TaskKey {
    pub fn window(&self) -> Option<&WindowId> {
        match self {
            TaskKey::Window(id, _) => Some(id),
            _ => None,
        }
    }
}

pub struct TaskRegistry<K> {
    tasks: HashMap<K, JoinHandle<()>>,
}

impl<K: Eq + Hash + Clone + Debug> Default for TaskRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Debug> TaskRegistry<K> {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Run `fut` under `key`, replacing whatever ran there before.
    pub fn spawn<F>(&mut self, key: K, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(old) = self.tasks.remove(&key) {
            debug!(?key, "replacing running task");
            old.abort();
        }
        self.tasks.insert(key, tokio::spawn(fut));
    }

    /// Call `tick` every `period` (first call after one period) until it
    /// returns `Break` or the task is cancelled.
    pub fn spawn_periodic<F, Fut>(&mut self, key: K, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        self.spawn(key, async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    break;
                }
            }
        });
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every task whose key matches `pred`; returns how many.
    pub fn cancel_where<P: Fn(&K) -> bool>(&mut self, pred: P) -> usize {
        let keys: Vec<K> = self.tasks.keys().filter(|k| pred(k)).cloned().collect();
        for key in &keys {
            self.cancel(key);
        }
        keys.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.tasks.get(key).is_some_and(|h| !h.is_finished())
    }

    /// Forget tasks that already ran to completion.
    pub fn prune(&mut self) {
        self.tasks.retain(|_, h| !h.is_finished());
    }

    pub fn active_keys(&self) -> Vec<K> {
        self.tasks
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<K> Drop for TaskRegistry<K> {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(registry: &mut TaskRegistry<TaskKey>, key: TaskKey, hits: Arc<AtomicUsize>) {
        registry.spawn_periodic(key, Duration::from_millis(100), move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_ticks_after_each_period() {
        let mut registry = TaskRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        counting(&mut registry, TaskKey::ProactivePoller, hits.clone());
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_replaces_instead_of_stacking() {
        let mut registry = TaskRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let key = TaskKey::ImageJob("job-1".into());
        counting(&mut registry, key.clone(), first.clone());
        counting(&mut registry, key.clone(), second.clone());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_stops_ticking() {
        let mut registry = TaskRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let key = TaskKey::Window(WindowId::new("monitor"), "metrics");
        counting(&mut registry, key.clone(), hits.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.cancel_where(|k| k.window().is_some()), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!registry.is_active(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn break_ends_the_loop() {
        let mut registry = TaskRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.spawn_periodic(TaskKey::BehaviorPoller, Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) >= 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        registry.prune();
        assert!(registry.is_empty());
    }
}
