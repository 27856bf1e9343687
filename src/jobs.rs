//! In-process job backend: bounded workers, status tracking, and result retention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::models::{JobStatus, RepoJob};
use crate::pipeline::ReadmeGenerator;
use crate::task::run_readme_task;

pub type JobId = Uuid;

/// Work executed for each queued job. The returned text is the job result.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, job: RepoJob) -> String;
}

#[async_trait]
impl TaskRunner for ReadmeGenerator {
    async fn run(&self, job: RepoJob) -> String {
        run_readme_task(self, &job).await
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    /// Set once the job finished successfully
    pub result: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    fn unknown(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            result: None,
            submitted_at: None,
            finished_at: None,
        }
    }
}

struct JobRecord {
    status: JobStatus,
    result: Option<String>,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    /// Monotonic finish time used for expiry
    finished: Option<Instant>,
}

struct QueueInner {
    records: RwLock<HashMap<JobId, JobRecord>>,
    permits: Arc<Semaphore>,
    runner: Arc<dyn TaskRunner>,
    ttl: Duration,
}

impl QueueInner {
    fn set_status(&self, id: JobId, status: JobStatus) {
        if let Some(record) = self.records.write().get_mut(&id) {
            record.status = status;
        }
    }

    fn finish(&self, id: JobId, status: JobStatus, result: Option<String>) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&id) {
            let now = Utc::now();
            tracing::info!(
                "Job {id} finished as {status:?} after {}s",
                (now - record.submitted_at).num_seconds()
            );
            record.status = status;
            record.result = result;
            record.finished_at = Some(now);
            record.finished = Some(Instant::now());
        }
    }

    fn is_expired(&self, record: &JobRecord) -> bool {
        record.finished.is_some_and(|t| t.elapsed() >= self.ttl)
    }
}

/// Runs jobs in the background and remembers their results for a while.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(runner: Arc<dyn TaskRunner>, max_concurrent: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                records: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                runner,
                ttl,
            }),
        }
    }

    /// Queue `job` and return its id without waiting for it to run.
    pub fn enqueue(&self, job: RepoJob) -> JobId {
        let id = Uuid::new_v4();
        self.inner.records.write().insert(
            id,
            JobRecord {
                status: JobStatus::Pending,
                result: None,
                submitted_at: Utc::now(),
                finished_at: None,
                finished: None,
            },
        );
        tracing::info!("Queued job {id} for {}", job.url);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _permit = match inner.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Job {id} could not get a worker: {e}");
                    inner.finish(id, JobStatus::Failure, None);
                    return;
                }
            };
            inner.set_status(id, JobStatus::Started);

            // A panic escaping the runner surfaces here as a JoinError
            let runner = inner.runner.clone();
            match tokio::spawn(async move { runner.run(job).await }).await {
                Ok(output) => inner.finish(id, JobStatus::Success, Some(output)),
                Err(e) => {
                    tracing::error!("Job {id} aborted: {e}");
                    inner.finish(id, JobStatus::Failure, None);
                }
            }
        });

        id
    }

    /// Current state of `id`. Unknown and expired ids read as pending.
    pub fn status(&self, id: JobId) -> JobSnapshot {
        let records = self.inner.records.read();
        match records.get(&id) {
            Some(record) if !self.inner.is_expired(record) => JobSnapshot {
                id,
                status: record.status,
                result: record.result.clone(),
                submitted_at: Some(record.submitted_at),
                finished_at: record.finished_at,
            },
            _ => JobSnapshot::unknown(id),
        }
    }

    /// Drop finished jobs older than the retention window. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut records = self.inner.records.write();
        let before = records.len();
        records.retain(|_, record| !self.inner.is_expired(record));
        before - records.len()
    }

    /// Purge expired results every `every` until the runtime shuts down.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = queue.purge_expired();
                if purged > 0 {
                    tracing::info!("Purged {purged} expired job results");
                }
            }
        })
    }
}
