use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Job, JobContext, JobError, JobId, JobStatus, RetryPolicy, TaskError, TaskStatus, Work};
use crate::document::Did;
use crate::store::{JobRepository, StoreError};

/// Worker pool and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of concurrent worker tasks
    pub worker_count: usize,
    /// Jobs accepted but not yet picked up by a worker
    pub max_queue_size: usize,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_size: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle on a submitted job
///
/// Several submissions deduplicated onto the same job each get a handle
/// observing the same completion.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    deduplicated: bool,
    done: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Whether the submission joined a job that was already in flight
    pub fn deduplicated(&self) -> bool {
        self.deduplicated
    }

    /// Wait until the job reaches a terminal status.
    ///
    /// Returns [`JobStatus::Pending`] if the orchestrator shut down before
    /// the job finished.
    pub async fn wait(mut self) -> JobStatus {
        loop {
            let status = *self.done.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if self.done.changed().await.is_err() {
                return *self.done.borrow();
            }
        }
    }

    /// Like [`JobHandle::wait`] but gives up after `timeout`
    pub async fn wait_timeout(self, timeout: Duration) -> Option<JobStatus> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}

struct QueuedJob {
    id: JobId,
    dedupe_key: String,
    work: Work,
    done: watch::Sender<JobStatus>,
}

struct InFlight {
    id: JobId,
    done: watch::Receiver<JobStatus>,
}

struct Inner {
    tx: flume::Sender<QueuedJob>,
    rx: flume::Receiver<QueuedJob>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    repository: Arc<dyn JobRepository>,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

/// Runs submitted work on a bounded pool of background workers
///
/// Submissions are queued on a bounded channel and return immediately.
/// While a job is pending, any submission with the same dedupe key resolves
/// to that job instead of starting another one.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
    workers: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("workers", &self.workers.lock().len())
            .field("queued", &self.inner.tx.len())
            .finish()
    }
}

impl JobOrchestrator {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(config: OrchestratorConfig, repository: Arc<dyn JobRepository>) -> Self {
        let (tx, rx) = flume::bounded(config.max_queue_size.max(1));
        let inner = Arc::new(Inner {
            tx,
            rx: rx.clone(),
            in_flight: Mutex::new(HashMap::new()),
            repository,
            retry: config.retry,
            shutdown: CancellationToken::new(),
        });

        let workers = (0..config.worker_count)
            .map(|worker| tokio::spawn(run_worker(worker, rx.clone(), inner.clone())))
            .collect();

        tracing::info!(
            "job orchestrator started with {} workers, queue size {}",
            config.worker_count,
            config.max_queue_size
        );

        Self {
            inner,
            workers: Arc::new(parking_lot::Mutex::new(workers)),
        }
    }

    /// Queue `work` on behalf of `owner`.
    ///
    /// Never waits for the work itself. Fails with [`JobError::QueueFull`]
    /// when the queue is at capacity.
    pub async fn submit(
        &self,
        owner: Did,
        dedupe_key: impl Into<String>,
        description: impl Into<String>,
        work: Work,
    ) -> Result<JobHandle, JobError> {
        let dedupe_key = dedupe_key.into();

        // checked under the lock so a job is never queued after shutdown drained the queue
        let mut in_flight = self.inner.in_flight.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(JobError::Shutdown);
        }
        if let Some(existing) = in_flight.get(&dedupe_key) {
            tracing::debug!("job {} already in flight for {}", existing.id, dedupe_key);
            return Ok(JobHandle {
                id: existing.id,
                deduplicated: true,
                done: existing.done.clone(),
            });
        }

        let mut job = Job::new(owner, dedupe_key.clone(), description, work.task_names());
        let id = job.id;
        job.log("queued", format!("queued with {} steps", work.tasks().len()));
        self.inner.repository.save(&job).await?;

        let (done_tx, done_rx) = watch::channel(JobStatus::Pending);
        let queued = QueuedJob {
            id,
            dedupe_key: dedupe_key.clone(),
            work,
            done: done_tx,
        };
        if let Err(e) = self.inner.tx.try_send(queued) {
            let error = match e {
                flume::TrySendError::Full(_) => JobError::QueueFull,
                flume::TrySendError::Disconnected(_) => JobError::Shutdown,
            };
            job.last_error = Some(error.to_string());
            job.finish(JobStatus::Failed);
            self.inner.persist(&job).await;
            return Err(error);
        }

        tracing::info!("queued job {} ({})", id, dedupe_key);
        in_flight.insert(
            dedupe_key,
            InFlight {
                id,
                done: done_rx.clone(),
            },
        );
        Ok(JobHandle {
            id,
            deduplicated: false,
            done: done_rx,
        })
    }

    /// Current record of a job. Other owners' jobs are reported as not found.
    pub async fn status(&self, owner: &Did, id: &JobId) -> Result<Job, JobError> {
        let job = self.inner.repository.get(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => JobError::NotFound(*id),
            e => JobError::Store(e),
        })?;
        if job.owner != *owner {
            return Err(JobError::NotFound(*id));
        }
        Ok(job)
    }

    /// Stop the workers. Running steps are abandoned and their jobs fail,
    /// as do jobs still waiting in the queue.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("job worker exited abnormally: {}", e);
            }
        }

        let mut in_flight = self.inner.in_flight.lock().await;
        let mut abandoned = 0;
        while let Ok(queued) = self.inner.rx.try_recv() {
            self.inner.abandon(queued, &mut in_flight).await;
            abandoned += 1;
        }
        tracing::info!("job orchestrator stopped, {} queued jobs abandoned", abandoned);
    }
}

async fn run_worker(worker: usize, rx: flume::Receiver<QueuedJob>, inner: Arc<Inner>) {
    tracing::debug!("job worker {} started", worker);
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            next = rx.recv_async() => match next {
                Ok(queued) => inner.execute(worker, queued).await,
                Err(_) => break,
            },
        }
    }
    tracing::debug!("job worker {} stopped", worker);
}

impl Inner {
    async fn execute(&self, worker: usize, queued: QueuedJob) {
        let QueuedJob {
            id,
            dedupe_key,
            work,
            done,
        } = queued;

        let status = match self.repository.get(&id).await {
            Ok(mut job) => {
                job.log("started", format!("picked up by worker {}", worker));
                let status = match AssertUnwindSafe(self.run_tasks(&mut job, &work))
                    .catch_unwind()
                    .await
                {
                    Ok(status) => status,
                    Err(panic) => {
                        let error = format!("step panicked: {}", panic_message(&*panic));
                        tracing::error!("job {} {}", id, error);
                        match job.tasks.iter().position(|t| t.status == TaskStatus::Running) {
                            Some(index) => self.fail_task(&mut job, index, error),
                            None => {
                                job.last_error = Some(error);
                                JobStatus::Failed
                            }
                        }
                    }
                };
                job.finish(status);
                self.persist(&job).await;
                status
            }
            Err(e) => {
                tracing::error!("job {} record missing: {}", id, e);
                JobStatus::Failed
            }
        };

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.get(&dedupe_key).map(|f| f.id) == Some(id) {
                in_flight.remove(&dedupe_key);
            }
        }
        tracing::info!("job {} finished: {}", id, status);
        done.send_replace(status);
    }

    async fn run_tasks(&self, job: &mut Job, work: &Work) -> JobStatus {
        for (index, task) in work.tasks().iter().enumerate() {
            let mut attempt = 0;
            loop {
                attempt += 1;
                if let Some(record) = job.task_mut(index) {
                    record.status = TaskStatus::Running;
                    record.attempts = attempt;
                }
                self.persist(job).await;

                let ctx = JobContext::new(job.id, attempt);
                let result = tokio::select! {
                    _ = self.shutdown.cancelled() => Err(TaskError::fatal("orchestrator shut down")),
                    result = task.call(ctx.clone()) => result,
                };
                job.values.extend(ctx.take_values());

                match result {
                    Ok(()) => {
                        if let Some(record) = job.task_mut(index) {
                            record.status = TaskStatus::Success;
                        }
                        job.log(task.name(), format!("completed after {} attempt(s)", attempt));
                        break;
                    }
                    Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                        let delay = self.retry.delay_after(attempt);
                        tracing::warn!(
                            "job {} step {} attempt {} failed, retrying in {:?}: {}",
                            job.id,
                            task.name(),
                            attempt,
                            delay,
                            e
                        );
                        job.log(task.name(), format!("attempt {} failed: {}", attempt, e));
                        job.last_error = Some(e.to_string());
                        self.persist(job).await;

                        let cancelled = tokio::select! {
                            _ = self.shutdown.cancelled() => true,
                            _ = tokio::time::sleep(delay) => false,
                        };
                        if cancelled {
                            return self.fail_task(job, index, "orchestrator shut down".to_string());
                        }
                    }
                    Err(e) => {
                        tracing::error!("job {} step {} failed: {}", job.id, task.name(), e);
                        return self.fail_task(job, index, e.to_string());
                    }
                }
            }
        }
        JobStatus::Success
    }

    /// Fail a job that never left the queue
    async fn abandon(&self, queued: QueuedJob, in_flight: &mut HashMap<String, InFlight>) {
        let QueuedJob {
            id,
            dedupe_key,
            done,
            ..
        } = queued;

        match self.repository.get(&id).await {
            Ok(mut job) => {
                job.log("abandoned", "orchestrator shut down before the job started");
                job.last_error = Some(JobError::Shutdown.to_string());
                job.finish(JobStatus::Failed);
                self.persist(&job).await;
            }
            Err(e) => tracing::error!("job {} record missing: {}", id, e),
        }

        if in_flight.get(&dedupe_key).map(|f| f.id) == Some(id) {
            in_flight.remove(&dedupe_key);
        }
        tracing::info!("job {} abandoned", id);
        done.send_replace(JobStatus::Failed);
    }

    fn fail_task(&self, job: &mut Job, index: usize, error: String) -> JobStatus {
        let name = job
            .task_mut(index)
            .map(|record| {
                record.status = TaskStatus::Failed;
                record.name.clone()
            })
            .unwrap_or_default();
        job.log(name, format!("failed: {}", error));
        job.last_error = Some(error);
        JobStatus::Failed
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.repository.save(job).await {
            tracing::error!("failed to persist job {}: {}", job.id, e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::store::MemoryJobRepository;

    fn orchestrator(worker_count: usize, max_queue_size: usize) -> JobOrchestrator {
        JobOrchestrator::start(
            OrchestratorConfig {
                worker_count,
                max_queue_size,
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(10),
                    max_delay: Duration::from_millis(50),
                    multiplier: 2.0,
                },
            },
            Arc::new(MemoryJobRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_runs_steps_in_order() {
        let jobs = orchestrator(2, 10);
        let owner = Did::random();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        let work = Work::new()
            .then("first", move |_| {
                let order = a.clone();
                async move {
                    order.lock().push("first");
                    Ok(())
                }
            })
            .then("second", move |ctx: JobContext| {
                let order = b.clone();
                async move {
                    order.lock().push("second");
                    ctx.set_value("answer", vec![42]);
                    Ok(())
                }
            });

        let handle = jobs.submit(owner, "ordered", "ordered steps", work).await.unwrap();
        let id = handle.id();
        assert_eq!(handle.wait().await, JobStatus::Success);
        assert_eq!(*order.lock(), vec!["first", "second"]);

        let job = jobs.status(&owner, &id).await.unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.values.get("answer"), Some(&vec![42]));
        assert!(job.tasks.iter().all(|t| t.status == TaskStatus::Success));
        assert!(job.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let jobs = orchestrator(1, 10);
        let owner = Did::random();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work = Work::new().then("flaky", move |ctx: JobContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.attempt() < 3 {
                    Err(TaskError::transient("not yet"))
                } else {
                    Ok(())
                }
            }
        });

        let handle = jobs.submit(owner, "flaky", "flaky step", work).await.unwrap();
        let id = handle.id();
        assert_eq!(handle.wait().await, JobStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let job = jobs.status(&owner, &id).await.unwrap();
        assert_eq!(job.task("flaky").unwrap().attempts, 3);
        assert_eq!(job.logs.iter().filter(|l| l.action == "flaky").count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let jobs = orchestrator(1, 10);
        let owner = Did::random();
        let work = Work::new()
            .then("down", |_| async { Err(TaskError::transient("ledger unavailable")) })
            .then("never", |_| async { Ok(()) });

        let handle = jobs.submit(owner, "down", "always down", work).await.unwrap();
        let id = handle.id();
        assert_eq!(handle.wait().await, JobStatus::Failed);

        let job = jobs.status(&owner, &id).await.unwrap();
        assert_eq!(job.task("down").unwrap().attempts, 3);
        assert_eq!(job.task("down").unwrap().status, TaskStatus::Failed);
        assert_eq!(job.task("never").unwrap().status, TaskStatus::Pending);
        assert!(job.last_error.unwrap().contains("ledger unavailable"));
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let jobs = orchestrator(1, 10);
        let owner = Did::random();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let work = Work::new().then("reject", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::fatal("rejected"))
            }
        });

        let handle = jobs.submit(owner, "reject", "rejected", work).await.unwrap();
        assert_eq!(handle.wait().await, JobStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dedupe_while_in_flight() {
        let jobs = orchestrator(2, 10);
        let owner = Did::random();
        let gate = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let make_work = || {
            let gate = gate.clone();
            let calls = calls.clone();
            Work::new().then("blocked", move |_| {
                let gate = gate.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    gate.cancelled().await;
                    Ok(())
                }
            })
        };

        let first = jobs.submit(owner, "anchor:1", "first", make_work()).await.unwrap();
        let second = jobs.submit(owner, "anchor:1", "second", make_work()).await.unwrap();
        let first_id = first.id();
        assert_eq!(first_id, second.id());
        assert!(!first.deduplicated());
        assert!(second.deduplicated());

        // a different key is a different job
        let other = jobs.submit(owner, "anchor:2", "other", make_work()).await.unwrap();
        assert_ne!(other.id(), first_id);

        gate.cancel();
        assert_eq!(first.wait().await, JobStatus::Success);
        assert_eq!(second.wait().await, JobStatus::Success);
        assert_eq!(other.wait().await, JobStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // finished jobs no longer absorb submissions
        let again = jobs.submit(owner, "anchor:1", "again", make_work()).await.unwrap();
        assert!(!again.deduplicated());
        assert_ne!(again.id(), first_id);
        assert_eq!(again.wait().await, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_status_is_owner_scoped() {
        let jobs = orchestrator(1, 10);
        let owner = Did::random();
        let handle = jobs
            .submit(owner, "noop", "noop", Work::new())
            .await
            .unwrap();
        let id = handle.id();
        handle.wait().await;

        assert!(jobs.status(&owner, &id).await.is_ok());
        assert!(matches!(
            jobs.status(&Did::random(), &id).await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            jobs.status(&owner, &JobId::new()).await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_full() {
        // no workers, so nothing drains the queue
        let jobs = orchestrator(0, 1);
        let owner = Did::random();
        jobs.submit(owner, "one", "one", Work::new()).await.unwrap();
        assert!(matches!(
            jobs.submit(owner, "two", "two", Work::new()).await,
            Err(JobError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_jobs() {
        let jobs = orchestrator(1, 4);
        let owner = Did::random();
        let started = Arc::new(tokio::sync::Notify::new());
        let calls = Arc::new(AtomicU32::new(0));

        let make_work = || {
            let started = started.clone();
            let calls = calls.clone();
            Work::new().then("stuck", move |_| {
                let started = started.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started.notify_one();
                    futures::future::pending::<()>().await;
                    Ok(())
                }
            })
        };

        let running = jobs.submit(owner, "running", "running", make_work()).await.unwrap();
        started.notified().await;
        let queued = jobs.submit(owner, "queued", "queued", make_work()).await.unwrap();
        let queued_id = queued.id();

        jobs.shutdown().await;

        let timeout = Duration::from_secs(5);
        assert_eq!(running.wait_timeout(timeout).await, Some(JobStatus::Failed));
        assert_eq!(queued.wait_timeout(timeout).await, Some(JobStatus::Failed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let job = jobs.status(&owner, &queued_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.task("stuck").unwrap().status, TaskStatus::Pending);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_panicking_step_fails_job() {
        let jobs = orchestrator(1, 4);
        let owner = Did::random();
        let work = Work::new().then("explode", |_| async {
            if true {
                panic!("ledger client bug");
            }
            Ok(())
        });

        let handle = jobs.submit(owner, "explode", "explode", work).await.unwrap();
        let id = handle.id();
        assert_eq!(
            handle.wait_timeout(Duration::from_secs(5)).await,
            Some(JobStatus::Failed)
        );

        let job = jobs.status(&owner, &id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.task("explode").unwrap().status, TaskStatus::Failed);
        assert!(job.last_error.unwrap().contains("ledger client bug"));

        // the key is free again and the single worker is still alive
        let again = jobs.submit(owner, "explode", "retry", Work::new()).await.unwrap();
        assert!(!again.deduplicated());
        assert_ne!(again.id(), id);
        assert_eq!(
            again.wait_timeout(Duration::from_secs(5)).await,
            Some(JobStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let jobs = orchestrator(1, 4);
        jobs.shutdown().await;
        assert!(matches!(
            jobs.submit(Did::random(), "late", "late", Work::new()).await,
            Err(JobError::Shutdown)
        ));
    }
}
