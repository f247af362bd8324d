//! # Task Queue
//!
//! At-least-once background execution of [`FetchJob`]s. The queue owns its
//! delivery policy: a failed job is redelivered after a fixed backoff up to
//! `max_attempts` times, then moved to the dead-letter list. This is
//! independent of the retry loop inside a single fetch.

use super::message::{FetchJob, JobId};
use crate::config::BackgroundJobsConfig;
use crate::error::{FetchError, QueueError};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// Producer side of the queue boundary
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, job: FetchJob) -> Result<JobId, QueueError>;

    /// Cancel a job that has not finished. A job waiting on its delay is
    /// dropped; a queued one is skipped; a running one completes but is not
    /// redelivered. Returns false for unknown or finished jobs.
    fn cancel(&self, id: JobId) -> bool;

    /// Whether the job is scheduled, queued, running or awaiting redelivery
    fn is_pending(&self, id: JobId) -> bool;
}

/// Consumer side: what workers run for each delivered job
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &FetchJob) -> Result<(), FetchError>;
}

/// Job that exhausted its delivery attempts
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: FetchJob,
    pub error: String,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
struct QueueShared {
    queue_name: String,
    max_attempts: u32,
    retry_backoff: Duration,
    sender: mpsc::UnboundedSender<FetchJob>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<FetchJob>>,
    scheduled: DashMap<JobId, AbortHandle>,
    /// Every job submitted and not yet finished
    live: DashSet<JobId>,
    /// Live jobs cancelled after leaving the schedule
    cancelled: DashSet<JobId>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    closed: AtomicBool,
    completed: AtomicU64,
}

impl QueueShared {
    fn closed_error(&self) -> QueueError {
        QueueError::Closed {
            queue_name: self.queue_name.clone(),
        }
    }

    fn submit(self: &Arc<Self>, job: FetchJob) -> Result<JobId, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }

        let id = job.id;
        self.live.insert(id);
        match job.delay.filter(|d| !d.is_zero()) {
            None => {
                if self.sender.send(job).is_err() {
                    self.live.remove(&id);
                    return Err(self.closed_error());
                }
            }
            Some(delay) => self.schedule(job, delay),
        }
        Ok(id)
    }

    fn schedule(self: &Arc<Self>, job: FetchJob, delay: Duration) {
        let id = job.id;
        let shared = Arc::clone(self);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            // wait until the abort handle is registered so removal below is exact
            if registered_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;

            if shared.scheduled.remove(&id).is_none() {
                return;
            }
            if shared.sender.send(job).is_err() {
                debug!(job_id = %id, "Queue closed before scheduled job became due");
            }
        });

        self.scheduled.insert(id, task.abort_handle());
        let _ = registered_tx.send(());
        debug!(job_id = %id, delay_ms = delay.as_millis() as u64, "⏳ Job scheduled");
    }

    async fn next_job(&self) -> Option<FetchJob> {
        self.receiver.lock().await.recv().await
    }

    fn finish(&self, id: JobId) {
        self.live.remove(&id);
        self.cancelled.remove(&id);
    }

    /// Consume a cancellation mark, finishing the job if one was set
    fn take_cancellation(&self, id: JobId) -> bool {
        if self.cancelled.remove(&id).is_some() {
            self.live.remove(&id);
            true
        } else {
            false
        }
    }

    fn cancel(&self, id: JobId) -> bool {
        if let Some((_, handle)) = self.scheduled.remove(&id) {
            handle.abort();
            self.finish(id);
            debug!(job_id = %id, "Scheduled job cancelled");
            return true;
        }
        if self.live.contains(&id) {
            self.cancelled.insert(id);
            debug!(job_id = %id, "In-flight job cancelled - no further deliveries");
            return true;
        }
        false
    }

    fn dead_letter(&self, job: FetchJob, error: &FetchError) {
        error!(
            queue = %self.queue_name,
            job_id = %job.id,
            report_type = %job.report_type,
            attempts = job.attempt,
            error = %error,
            "💀 Job exhausted delivery attempts - dead-lettered"
        );
        self.dead_letters.lock().push(DeadLetter {
            job,
            error: error.reason(),
            failed_at: chrono::Utc::now(),
        });
    }
}

/// In-process queue backed by an unbounded channel and a fixed worker pool.
///
/// Cloning is cheap and every clone feeds the same workers.
#[derive(Debug, Clone)]
pub struct InProcessTaskQueue {
    shared: Arc<QueueShared>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    worker_count: usize,
}

impl InProcessTaskQueue {
    /// Create the queue. Jobs submitted before [`InProcessTaskQueue::start`]
    /// are buffered.
    pub fn new(config: &BackgroundJobsConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(QueueShared {
                queue_name: config.queue_name.clone(),
                max_attempts: config.max_attempts.max(1),
                retry_backoff: config.retry_backoff(),
                sender,
                receiver: tokio::sync::Mutex::new(receiver),
                scheduled: DashMap::new(),
                live: DashSet::new(),
                cancelled: DashSet::new(),
                dead_letters: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                completed: AtomicU64::new(0),
            }),
            workers: Arc::new(Mutex::new(Vec::new())),
            worker_count: config.workers.max(1),
        }
    }

    /// Spawn the worker pool
    pub fn start(&self, handler: Arc<dyn JobHandler>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            warn!(queue = %self.shared.queue_name, "Task queue workers already started");
            return;
        }

        for worker_id in 0..self.worker_count {
            let shared = Arc::clone(&self.shared);
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(run_worker(worker_id, shared, handler)));
        }

        info!(
            queue = %self.shared.queue_name,
            workers = self.worker_count,
            max_attempts = self.shared.max_attempts,
            "🚀 Task queue workers started"
        );
    }

    /// Stop accepting jobs, drop pending scheduled jobs and stop the workers.
    /// A job already being handled is aborted at its next await point.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);

        let scheduled: Vec<JobId> = self.shared.scheduled.iter().map(|e| *e.key()).collect();
        for id in scheduled {
            if let Some((_, handle)) = self.shared.scheduled.remove(&id) {
                handle.abort();
            }
        }
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        self.shared.live.clear();
        self.shared.cancelled.clear();

        info!(queue = %self.shared.queue_name, "🛑 Task queue shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn queue_name(&self) -> &str {
        &self.shared.queue_name
    }

    /// Jobs waiting on a delay (including redeliveries)
    pub fn scheduled_count(&self) -> usize {
        self.shared.scheduled.len()
    }

    pub fn is_scheduled(&self, id: JobId) -> bool {
        self.shared.scheduled.contains_key(&id)
    }

    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.lock().clone()
    }
}

#[async_trait]
impl TaskQueue for InProcessTaskQueue {
    async fn enqueue(&self, job: FetchJob) -> Result<JobId, QueueError> {
        let job = if job.queue_name == self.shared.queue_name {
            job
        } else {
            job.on_queue(self.shared.queue_name.clone())
        };

        let id = self.shared.submit(job)?;
        debug!(queue = %self.shared.queue_name, job_id = %id, "📥 Job enqueued");
        Ok(id)
    }

    fn cancel(&self, id: JobId) -> bool {
        self.shared.cancel(id)
    }

    fn is_pending(&self, id: JobId) -> bool {
        self.shared.live.contains(&id)
    }
}

async fn run_worker(worker_id: usize, shared: Arc<QueueShared>, handler: Arc<dyn JobHandler>) {
    while let Some(job) = shared.next_job().await {
        debug!(
            worker_id,
            job_id = %job.id,
            report_type = %job.report_type,
            attempt = job.attempt,
            "Worker picked up job"
        );

        if shared.take_cancellation(job.id) {
            debug!(worker_id, job_id = %job.id, "Skipping cancelled job");
            continue;
        }

        match handler.handle(&job).await {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                shared.finish(job.id);
            }
            Err(e) if shared.take_cancellation(job.id) => {
                debug!(worker_id, job_id = %job.id, error = %e, "Cancelled job failed - not redelivering");
            }
            Err(e) if job.attempt < shared.max_attempts => {
                warn!(
                    worker_id,
                    job_id = %job.id,
                    attempt = job.attempt,
                    max_attempts = shared.max_attempts,
                    backoff_seconds = shared.retry_backoff.as_secs(),
                    error = %e,
                    "Job failed - scheduling redelivery"
                );
                if shared.closed.load(Ordering::Acquire) {
                    shared.finish(job.id);
                    continue;
                }
                shared.schedule(job.redelivery(shared.retry_backoff), shared.retry_backoff);
            }
            Err(e) => {
                shared.finish(job.id);
                shared.dead_letter(job, &e);
            }
        }
    }
    debug!(worker_id, "Worker stopped - channel closed");
}
