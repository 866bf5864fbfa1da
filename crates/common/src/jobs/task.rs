use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::JobId;

/// Failure of a single step
///
/// Transient failures are retried with backoff until the attempts run out,
/// fatal failures fail the job straight away.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("transient: {0}")]
    Transient(anyhow::Error),
    #[error("fatal: {0}")]
    Fatal(anyhow::Error),
}

impl TaskError {
    pub fn transient(msg: impl std::fmt::Display) -> Self {
        TaskError::Transient(anyhow::anyhow!("{}", msg))
    }

    pub fn fatal(msg: impl std::fmt::Display) -> Self {
        TaskError::Fatal(anyhow::anyhow!("{}", msg))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::Transient(_))
    }
}

/// Handed to every step invocation
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    attempt: u32,
    values: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl JobContext {
    pub(crate) fn new(job_id: JobId, attempt: u32) -> Self {
        Self {
            job_id,
            attempt,
            values: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// 1-based attempt number of the running step
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Publish a value on the job record
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.values.lock().insert(key.into(), value.into());
    }

    pub(crate) fn take_values(&self) -> BTreeMap<String, Vec<u8>> {
        std::mem::take(&mut *self.values.lock())
    }
}

pub type TaskFuture = BoxFuture<'static, Result<(), TaskError>>;

type TaskFn = Arc<dyn Fn(JobContext) -> TaskFuture + Send + Sync>;

/// A named, re-runnable step
#[derive(Clone)]
pub struct Task {
    name: String,
    run: TaskFn,
}

impl Task {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |ctx| run(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, ctx: JobContext) -> TaskFuture {
        (self.run)(ctx)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

/// Ordered list of steps making up a job
#[derive(Debug, Clone, Default)]
pub struct Work {
    tasks: Vec<Task>,
}

impl Work {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; steps run strictly in the order they were added
    pub fn then<F, Fut>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.tasks.push(Task::new(name, run));
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Exponential backoff for transient step failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per step, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_work_keeps_order() {
        let work = Work::new()
            .then("first", |_| async { Ok(()) })
            .then("second", |_| async { Err(TaskError::fatal("boom")) });
        assert_eq!(work.task_names(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_context_values() {
        let ctx = JobContext::new(JobId::new(), 1);
        let task = Task::new("set", |ctx: JobContext| async move {
            ctx.set_value("root", vec![1, 2, 3]);
            Ok(())
        });
        task.call(ctx.clone()).await.unwrap();
        let values = ctx.take_values();
        assert_eq!(values.get("root"), Some(&vec![1, 2, 3]));
        assert!(ctx.take_values().is_empty());
    }

    #[test]
    fn test_error_kinds() {
        assert!(TaskError::transient("later").is_transient());
        assert!(!TaskError::fatal("never").is_transient());
    }
}
