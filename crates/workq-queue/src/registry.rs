//! Worker registry

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::worker::Worker;

/// A worker instance and the token it was registered with
#[derive(Clone)]
struct Entry {
    worker: Arc<dyn Worker>,
    ctx: CancellationToken,
}

impl Entry {
    fn live(&self) -> bool {
        !self.ctx.is_cancelled()
    }
}

/// Multi-map from worker type to the interchangeable instances serving it.
///
/// An instance whose registration token is cancelled is no longer selected
/// or counted.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Vec<Entry>>>,
}

fn same_instance(a: &Arc<dyn Worker>, b: &Arc<dyn Worker>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `worker` to the bucket named by its id.
    ///
    /// Returns `false` when this very instance is already registered and live.
    pub async fn register(&self, worker: Arc<dyn Worker>, ctx: CancellationToken) -> bool {
        let mut workers = self.workers.write().await;
        let bucket = workers.entry(worker.id().to_string()).or_default();
        bucket.retain(Entry::live);
        if bucket.iter().any(|e| same_instance(&e.worker, &worker)) {
            return false;
        }
        bucket.push(Entry { worker, ctx });
        true
    }

    /// Pick one of the live workers registered for `worker_type` uniformly at
    /// random, together with its registration token
    pub async fn select_for(
        &self,
        worker_type: &str,
    ) -> Option<(Arc<dyn Worker>, CancellationToken)> {
        let workers = self.workers.read().await;
        let live: Vec<&Entry> = workers.get(worker_type)?.iter().filter(|e| e.live()).collect();
        if live.is_empty() {
            return None;
        }
        let entry = live[rand::rng().random_range(0..live.len())];
        Some((entry.worker.clone(), entry.ctx.clone()))
    }

    pub async fn contains(&self, worker_type: &str) -> bool {
        self.count(worker_type).await > 0
    }

    pub async fn count(&self, worker_type: &str) -> usize {
        self.workers
            .read()
            .await
            .get(worker_type)
            .map_or(0, |bucket| bucket.iter().filter(|e| e.live()).count())
    }

    pub async fn total(&self) -> usize {
        self.workers
            .read()
            .await
            .values()
            .flatten()
            .filter(|e| e.live())
            .count()
    }

    pub async fn worker_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.workers.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    pub(crate) async fn clear(&self) {
        self.workers.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::worker::WorkError;
    use async_trait::async_trait;

    struct NamedWorker(&'static str);

    #[async_trait]
    impl Worker for NamedWorker {
        fn id(&self) -> &str {
            self.0
        }

        async fn do_work(&self, _ctx: CancellationToken, _job: &Job) -> Result<(), WorkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_groups_by_id() {
        let registry = WorkerRegistry::new();
        assert!(registry.register(Arc::new(NamedWorker("aw")), CancellationToken::new()).await);
        assert!(registry.register(Arc::new(NamedWorker("aw")), CancellationToken::new()).await);
        assert!(registry.register(Arc::new(NamedWorker("lcalw")), CancellationToken::new()).await);

        assert_eq!(registry.count("aw").await, 2);
        assert_eq!(registry.total().await, 3);
        assert_eq!(registry.worker_types().await, vec!["aw", "lcalw"]);
    }

    #[tokio::test]
    async fn test_same_instance_registers_once() {
        let registry = WorkerRegistry::new();
        let worker: Arc<dyn Worker> = Arc::new(NamedWorker("aw"));
        assert!(registry.register(worker.clone(), CancellationToken::new()).await);
        assert!(!registry.register(worker, CancellationToken::new()).await);
        assert_eq!(registry.count("aw").await, 1);
    }

    #[tokio::test]
    async fn test_select_for_unknown_type() {
        let registry = WorkerRegistry::new();
        registry.register(Arc::new(NamedWorker("aw")), CancellationToken::new()).await;

        assert!(registry.select_for("missing").await.is_none());
        let (worker, _) = registry.select_for("aw").await.unwrap();
        assert_eq!(worker.id(), "aw");
    }

    #[tokio::test]
    async fn test_cancelled_registration_is_not_selected() {
        let registry = WorkerRegistry::new();
        let ctx = CancellationToken::new();
        let worker: Arc<dyn Worker> = Arc::new(NamedWorker("aw"));
        registry.register(worker.clone(), ctx.clone()).await;

        ctx.cancel();
        assert!(registry.select_for("aw").await.is_none());
        assert_eq!(registry.count("aw").await, 0);
        assert!(!registry.contains("aw").await);

        let fresh = CancellationToken::new();
        assert!(registry.register(worker, fresh.clone()).await);
        let (_, token) = registry.select_for("aw").await.unwrap();
        assert!(!token.is_cancelled());
        fresh.cancel();
        assert!(token.is_cancelled());
    }
}
