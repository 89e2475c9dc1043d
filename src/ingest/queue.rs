//! Background ingestion queue.
//!
//! Uploads are acknowledged immediately and processed by spawned tasks. A
//! semaphore caps how many files are ingested at once; everything else
//! waits its turn. Job records stay queryable after completion so clients
//! can poll or wait for a result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::pipeline::{IngestPipeline, IngestReport};

/// Finished jobs kept around for polling before the oldest get pruned.
const RETAINED_JOBS: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        #[serde(flatten)]
        report: IngestReport,
    },
    Failed {
        error: String,
    },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub filename: String,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct IngestQueue {
    pipeline: Arc<IngestPipeline>,
    jobs: RwLock<HashMap<Uuid, IngestJob>>,
    permits: Arc<Semaphore>,
    changed: Notify,
}

impl IngestQueue {
    pub fn new(pipeline: Arc<IngestPipeline>, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline,
            jobs: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            changed: Notify::new(),
        }
    }

    /// Registers a job for the saved upload at `path` and spawns its worker.
    /// The file is deleted once the job finishes, whatever the outcome.
    pub async fn submit(self: &Arc<Self>, path: PathBuf, original_name: String) -> Uuid {
        let id = Uuid::new_v4();
        let job = IngestJob {
            id,
            filename: original_name.clone(),
            state: JobState::Queued,
            submitted_at: Utc::now(),
            finished_at: None,
        };

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(id, job);
            prune_finished(&mut jobs, RETAINED_JOBS);
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.run_job(id, path, original_name).await;
        });

        id
    }

    async fn run_job(&self, id: Uuid, path: PathBuf, original_name: String) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish_job(id, JobState::Failed {
                    error: "ingestion queue is shut down".to_string(),
                })
                .await;
                return;
            }
        };

        self.set_state(id, JobState::Running).await;
        info!("Ingest job {} started for '{}'", id, original_name);

        let outcome = self.pipeline.process_and_store(&path, &original_name).await;
        match outcome {
            Ok(report) => {
                self.finish_job(id, JobState::Completed { report }).await;
                info!("Ingest job {} finished for '{}'", id, original_name);
            }
            Err(err) => {
                error!("Ingest job {} failed for '{}': {}", id, original_name, err);
                self.finish_job(id, JobState::Failed {
                    error: err.to_string(),
                })
                .await;
            }
        }

        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload '{}': {}", path.display(), err);
            }
        }
        drop(permit);
    }

    async fn set_state(&self, id: Uuid, state: JobState) {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(&id) {
                job.state = state;
            }
        }
        self.changed.notify_waiters();
    }

    async fn finish_job(&self, id: Uuid, state: JobState) {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(&id) {
                job.state = state;
                job.finished_at = Some(Utc::now());
            }
        }
        self.changed.notify_waiters();
    }

    pub async fn get(&self, id: Uuid) -> Option<IngestJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All known jobs, newest submission first.
    pub async fn list(&self) -> Vec<IngestJob> {
        let mut jobs: Vec<IngestJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs
    }

    /// Blocks until the job reaches a terminal state, then returns it.
    /// Unknown ids return `None` right away.
    pub async fn await_job(&self, id: Uuid) -> Option<IngestJob> {
        loop {
            let notified = self.changed.notified();
            match self.get(id).await {
                Some(job) if job.state.is_finished() => return Some(job),
                Some(_) => {}
                None => return None,
            }
            notified.await;
        }
    }
}

/// Drops the oldest finished jobs once the registry exceeds `cap`. Queued
/// and running jobs are never pruned.
fn prune_finished(jobs: &mut HashMap<Uuid, IngestJob>, cap: usize) {
    if jobs.len() <= cap {
        return;
    }
    let mut finished: Vec<(Uuid, DateTime<Utc>)> = jobs
        .values()
        .filter(|job| job.state.is_finished())
        .map(|job| (job.id, job.finished_at.unwrap_or(job.submitted_at)))
        .collect();
    finished.sort_by_key(|(_, at)| *at);

    let excess = jobs.len() - cap;
    for (id, _) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
