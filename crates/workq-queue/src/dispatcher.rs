//! Dispatcher: owns the dispatch queue, the worker registry and one
//! dispatch loop per registered worker.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::dispatch_queue::{DispatchQueue, Notification};
use crate::error::QueueError;
use crate::job::{Job, JobId, NewJob};
use crate::registry::WorkerRegistry;
use crate::store::{JobStore, StoreError};
use crate::worker::Worker;

/// Persistent job dispatcher.
///
/// Delivery is at-least-once: a job that was running when the process died
/// is executed again by [`Dispatcher::resume_pending_jobs`].
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    queue: DispatchQueue,
    registry: WorkerRegistry,
    shutdown: CancellationToken,
    loops: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(id: impl Into<String>, store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        let queue = DispatchQueue::new(config.capacity, config.multi_queue);
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                store,
                config,
                queue,
                registry: WorkerRegistry::new(),
                shutdown: CancellationToken::new(),
                loops: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Configured retry ceiling
    pub fn retries(&self) -> u32 {
        self.inner.config.max_retries
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.queue.len().await
    }

    pub async fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity().await
    }

    pub async fn worker_count(&self, worker_type: &str) -> usize {
        self.inner.registry.count(worker_type).await
    }

    /// Persist `job` and notify the dispatch loops.
    ///
    /// Waits while the dispatch queue is full (single-level mode). If the
    /// store rejects the job nothing is enqueued.
    pub async fn push_job(&self, job: NewJob) -> Result<JobId, QueueError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        if inner.config.strict_routing && !inner.registry.contains(&job.worker_type).await {
            return Err(QueueError::NoWorker(job.worker_type));
        }

        let worker_type = job.worker_type.clone();
        let id = inner.store.create(job).await.map_err(|e| {
            error!(dispatcher = %inner.id, worker_type = %worker_type, error = %e, "Unable to persist job");
            e
        })?;

        inner
            .queue
            .push(Notification::new(id, worker_type.clone(), 0))
            .await?;
        debug!(dispatcher = %inner.id, job_id = %id, worker_type = %worker_type, "Job pushed");
        Ok(id)
    }

    /// Register `worker` and start a dispatch loop for it.
    ///
    /// The loop runs until `ctx` is cancelled or the dispatcher is closed.
    /// `ctx` is also the token handed to every `do_work` call on `worker`,
    /// whichever loop picks the job up, and once it is cancelled the
    /// instance stops receiving jobs.
    pub async fn register_worker(&self, ctx: CancellationToken, worker: Arc<dyn Worker>) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            warn!(dispatcher = %inner.id, worker_type = worker.id(), "Dispatcher closed, worker not registered");
            return;
        }
        if !inner.registry.register(worker.clone(), ctx.clone()).await {
            debug!(dispatcher = %inner.id, worker_type = worker.id(), "Worker instance already registered");
            return;
        }

        let loop_inner = inner.clone();
        inner
            .loops
            .lock()
            .await
            .spawn(async move { loop_inner.dispatch_loop(ctx).await });

        info!(
            dispatcher = %inner.id,
            worker_type = worker.id(),
            instances = inner.registry.count(worker.id()).await,
            "Worker registered"
        );
    }

    /// Re-enqueue every unfinished job left in the store by a previous run.
    ///
    /// Jobs that already spent their retries are marked failed instead.
    /// Returns how many jobs were resumed.
    pub async fn resume_pending_jobs(&self) -> Result<usize, QueueError> {
        let inner = &self.inner;
        let jobs = inner.store.list_unfinished().await.map_err(|e| {
            error!(dispatcher = %inner.id, error = %e, "Unable to load jobs for recovery");
            e
        })?;

        let mut resumed = 0;
        for job in jobs {
            if job.status.is_terminal() {
                continue;
            }
            if job.retry_count < inner.config.max_retries {
                inner
                    .queue
                    .push(Notification::new(job.id, job.worker_type, job.retry_count))
                    .await?;
                resumed += 1;
            } else {
                error!(
                    dispatcher = %inner.id,
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    "Retries already exhausted, marking job failed"
                );
                if let Err(e) = inner
                    .store
                    .set_failed(job.id, Some("retries exhausted before recovery".into()))
                    .await
                {
                    error!(job_id = %job.id, error = %e, "Unable to mark job failed");
                }
            }
        }

        info!(dispatcher = %inner.id, resumed, "Resumed pending jobs");
        Ok(resumed)
    }

    /// Stop the dispatch loops from taking new work, wait for in-flight
    /// jobs, then close the dispatch queue.
    ///
    /// Returns `ShutdownInterrupted` if `ctx` is cancelled first. The
    /// remaining loops keep finishing their current job and stay tracked,
    /// so a later `close` waits for them again.
    pub async fn close(&self, ctx: CancellationToken) -> Result<(), QueueError> {
        let inner = &self.inner;
        inner.shutdown.cancel();

        let mut loops = inner.loops.lock().await;
        let drained = tokio::select! {
            _ = drain(&mut loops) => true,
            _ = ctx.cancelled() => false,
        };
        if !drained {
            warn!(dispatcher = %inner.id, remaining = loops.len(), "Shutdown interrupted");
            return Err(QueueError::ShutdownInterrupted);
        }
        drop(loops);

        inner.queue.close().await;
        let abandoned = inner.queue.len().await;
        inner.registry.clear().await;
        info!(dispatcher = %inner.id, queued = abandoned, "Dispatcher closed");
        Ok(())
    }
}

async fn drain(loops: &mut JoinSet<()>) {
    while let Some(res) = loops.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "Dispatch loop ended abnormally");
        }
    }
}

enum Step {
    Continue,
    Stop,
}

impl Inner {
    fn stopping(&self, ctx: &CancellationToken) -> bool {
        ctx.is_cancelled() || self.shutdown.is_cancelled()
    }

    /// Sleep unless cancelled first. Returns `Step::Stop` on cancellation.
    async fn pause(&self, ctx: &CancellationToken, duration: Duration) -> Step {
        tokio::select! {
            _ = ctx.cancelled() => Step::Stop,
            _ = self.shutdown.cancelled() => Step::Stop,
            _ = sleep(duration) => Step::Continue,
        }
    }

    async fn dispatch_loop(self: Arc<Self>, ctx: CancellationToken) {
        debug!(dispatcher = %self.id, "Dispatch loop started");
        while !self.stopping(&ctx) {
            let step = match self.queue.try_pop().await {
                Some(notification) => self.dispatch(&ctx, notification).await,
                None => self.pause(&ctx, self.config.poll_interval).await,
            };
            if let Step::Stop = step {
                break;
            }
        }
        debug!(dispatcher = %self.id, "Dispatch loop stopped");
    }

    async fn dispatch(&self, ctx: &CancellationToken, notification: Notification) -> Step {
        let Some((worker, worker_ctx)) = self.registry.select_for(&notification.worker_type).await
        else {
            warn!(
                dispatcher = %self.id,
                job_id = %notification.job_id,
                worker_type = %notification.worker_type,
                "No worker registered for job type, re-queueing"
            );
            self.requeue(notification).await;
            return self.pause(ctx, self.config.poll_interval).await;
        };

        let mut job = match self.store.get(notification.job_id).await {
            Ok(job) => job,
            Err(StoreError::NotFound(id)) => {
                error!(dispatcher = %self.id, job_id = %id, "Job vanished from store, dropping notification");
                return Step::Continue;
            }
            Err(e) => {
                error!(dispatcher = %self.id, job_id = %notification.job_id, error = %e, "Unable to load job, re-queueing");
                self.requeue(notification).await;
                return self.pause(ctx, self.config.poll_interval).await;
            }
        };

        if job.status.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Job already finished, skipping");
            return Step::Continue;
        }
        job.retry_count = job.retry_count.max(notification.retry_count);

        self.execute(ctx, worker, &worker_ctx, job).await
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        worker: Arc<dyn Worker>,
        worker_ctx: &CancellationToken,
        job: Job,
    ) -> Step {
        let marked_running = match self.store.set_running(job.id).await {
            Ok(()) => true,
            Err(e @ (StoreError::InvalidTransition { .. } | StoreError::NotFound(_))) => {
                warn!(job_id = %job.id, error = %e, "Job cannot run, skipping");
                return Step::Continue;
            }
            // Keep going: a store outage must not stall healthy workers
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Unable to mark job running");
                false
            }
        };

        let started = Instant::now();
        let result = worker.do_work(worker_ctx.clone(), &job).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // Every outcome transition starts from RUNNING. If this write fails
        // too, the row stays unfinished and the next recovery runs it again.
        if !marked_running {
            if let Err(e) = self.store.set_running(job.id).await {
                error!(job_id = %job.id, error = %e, "Still unable to mark job running");
            }
        }

        let err = match result {
            Ok(()) => {
                if let Err(e) = self.store.set_completed(job.id).await {
                    error!(job_id = %job.id, error = %e, "Unable to mark job completed");
                }
                info!(job_id = %job.id, worker_type = %job.worker_type, elapsed_ms, "Job completed");
                return Step::Continue;
            }
            Err(err) => err,
        };

        if err.is_retryable() && job.retry_count < self.config.max_retries {
            if let Err(e) = self.store.set_retry(job.id, Some(err.to_string())).await {
                error!(job_id = %job.id, error = %e, "Unable to mark job for retry");
            }
            let retry_count = job.retry_count + 1;
            let delay = self.config.retry_delay(retry_count);
            warn!(
                job_id = %job.id,
                worker_type = %job.worker_type,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Job failed, scheduling retry with backoff"
            );

            if let Step::Stop = self.pause(ctx, delay).await {
                info!(job_id = %job.id, "Shutting down during backoff, job left for recovery");
                return Step::Stop;
            }
            self.requeue(Notification::new(job.id, job.worker_type, retry_count))
                .await;
            return Step::Continue;
        }

        if err.is_retryable() {
            error!(
                job_id = %job.id,
                worker_type = %job.worker_type,
                retry_count = job.retry_count,
                error = %err,
                "Retries exhausted, abandoning job"
            );
        } else {
            error!(job_id = %job.id, worker_type = %job.worker_type, error = %err, "Job failed fatally");
        }
        if let Err(e) = self.store.set_failed(job.id, Some(err.to_string())).await {
            error!(job_id = %job.id, error = %e, "Unable to mark job failed");
        }
        Step::Continue
    }

    async fn requeue(&self, notification: Notification) {
        let job_id = notification.job_id;
        if self.queue.requeue(notification).await.is_err() {
            warn!(job_id = %job_id, "Dispatch queue closed, job left for recovery");
        }
    }
}
