use std::sync::Arc;
use std::time::Duration;

use courier_core::config::WorkerConfig;
use courier_executor::ExecutorRegistry;
use courier_queue::{JobRecord, JobStatus, QueueError, QueueStore};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// N workers plus one lease-reclamation sweep, all against the same store.
pub struct WorkerPool {
    store: Arc<QueueStore>,
    registry: Arc<ExecutorRegistry>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<QueueStore>,
        registry: Arc<ExecutorRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run until `shutdown` broadcasts `true`, then drain.
    ///
    /// Drain means: workers stop leasing, finish their in-flight job, and
    /// exit; the call returns once every task has joined. A job interrupted
    /// harder than that (process kill) is recovered later via lease expiry.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(workers = self.config.workers, "worker pool started");

        let mut tasks = JoinSet::new();
        for n in 0..self.config.workers.max(1) {
            let worker_id = format!("worker-{n}-{}", Uuid::new_v4());
            tasks.spawn(worker_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                self.config.clone(),
                worker_id,
                shutdown.clone(),
            ));
        }
        tasks.spawn(reclaim_loop(
            Arc::clone(&self.store),
            self.config.clone(),
            shutdown.clone(),
        ));

        while tasks.join_next().await.is_some() {}
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    store: Arc<QueueStore>,
    registry: Arc<ExecutorRegistry>,
    config: WorkerConfig,
    worker_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(%worker_id, "worker started");
    let lease = Duration::from_secs(config.lease_secs);
    let poll = Duration::from_secs(config.poll_interval_secs);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = match store.lease(&worker_id, lease) {
            Ok(job) => job,
            Err(e) => {
                // Store unavailable: treat like an empty queue and poll again.
                warn!(%worker_id, "lease failed: {e}");
                None
            }
        };

        match job {
            Some(job) => run_job(&store, &registry, &worker_id, job).await,
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }
    info!(%worker_id, "worker stopped");
}

/// Execute one leased job and report the outcome to the store.
///
/// `NotFound` from `complete`/`fail` means the lease expired mid-execution
/// and another worker may already own the record, so the result is dropped.
async fn run_job(
    store: &QueueStore,
    registry: &ExecutorRegistry,
    worker_id: &str,
    job: JobRecord,
) {
    info!(
        %worker_id,
        job_id = %job.id,
        kind = %job.kind,
        attempt = job.attempts + 1,
        "executing job"
    );

    match registry.execute(&job.kind, &job.payload).await {
        Ok(()) => match store.complete(&job.id, worker_id) {
            Ok(()) => {}
            Err(QueueError::NotFound { .. }) => {
                warn!(%worker_id, job_id = %job.id, "lease lost before completion — result discarded");
            }
            Err(e) => error!(%worker_id, job_id = %job.id, "complete failed: {e}"),
        },
        Err(exec_err) => {
            let retry = exec_err.is_retryable();
            match store.fail(&job.id, worker_id, &exec_err.to_string(), retry) {
                Ok(JobStatus::Pending) => {
                    warn!(%worker_id, job_id = %job.id, error = %exec_err, "job failed — will retry");
                }
                Ok(status) => {
                    error!(%worker_id, job_id = %job.id, error = %exec_err, %status, "job failed terminally");
                }
                Err(QueueError::NotFound { .. }) => {
                    warn!(%worker_id, job_id = %job.id, "lease lost before failure report");
                }
                Err(e) => error!(%worker_id, job_id = %job.id, "fail transition failed: {e}"),
            }
        }
    }
}

/// Periodic sweep making crashed workers' jobs eligible again.
async fn reclaim_loop(
    store: Arc<QueueStore>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.reclaim_interval_secs.max(1)));
    // Skip the interval's immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = store.reclaim_expired() {
                    warn!("lease reclamation failed: {e}");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
