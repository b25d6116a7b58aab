//! Job lifecycle state machine.
//!
//! One controller per process owns every caption job: it validates and
//! creates jobs, spawns their workers on a shared task tracker, and applies
//! the guarded status transitions for pause, resume, and cancel. Pause,
//! resume, and cancel are idempotent no-ops when the precondition status
//! does not hold: they return the job unchanged rather than erroring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use capstudio_core::config::VisionConfig;
use capstudio_core::error::CoreError;
use capstudio_core::job::{CreateJob, Job};
use capstudio_core::status::JobStatus;
use capstudio_core::store::Store;
use capstudio_core::types::Id;
use capstudio_vision::backend::BackendRegistry;

use crate::pipeline::CaptionPipeline;
use crate::progress::{self, ProgressEvent};
use crate::worker;

/// Default poll interval for pause polling and progress snapshots.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One live worker instance: its supersession token and the task handle
/// the next instance waits on before touching the job.
struct WorkerRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct JobController<S: Store + ?Sized + 'static> {
    store: Arc<S>,
    registry: Arc<dyn BackendRegistry>,
    cfg: VisionConfig,
    tracker: TaskTracker,
    /// Live worker instance per job. Resume cancels the previous token and
    /// the replacement awaits its exit, so two workers never race one job.
    runs: Mutex<HashMap<Id, WorkerRun>>,
    poll_interval: Duration,
}

impl<S: Store + ?Sized + 'static> JobController<S> {
    pub fn new(store: Arc<S>, registry: Arc<dyn BackendRegistry>, cfg: VisionConfig) -> Self {
        Self {
            store,
            registry,
            cfg,
            tracker: TaskTracker::new(),
            runs: Mutex::new(HashMap::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the pause-poll and progress-snapshot interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create a job over the caption set's eligible files and start its
    /// worker. Fails `Invalid` when the set is missing, the backend id is
    /// unknown, or there is nothing to caption.
    pub async fn create(&self, req: CreateJob) -> Result<Job, CoreError> {
        let set = self
            .store
            .find_caption_set(req.caption_set_id)
            .await?
            .ok_or_else(|| {
                CoreError::Invalid(format!("Caption set not found: {}", req.caption_set_id))
            })?;

        let backend = req.backend.unwrap_or_else(|| self.cfg.backend.clone());
        // Resolve up front so an unsupported backend fails the create call
        // instead of every file.
        self.registry.resolve(&backend)?;
        let model = req.model.unwrap_or_else(|| self.cfg.default_model.clone());

        let eligible = self.store.eligible_members(set.dataset_id).await?;
        let total = if req.overwrite_existing {
            eligible.len()
        } else {
            let captioned = self.store.captioned_file_ids(set.id).await?;
            eligible
                .iter()
                .filter(|m| !captioned.contains(&m.file_id))
                .count()
        };
        if total == 0 {
            return Err(CoreError::Invalid(
                "No eligible files to caption in this set".into(),
            ));
        }

        let job = Job {
            id: Id::new_v4(),
            caption_set_id: set.id,
            backend,
            model,
            style: set.style,
            template_id: req.template_id.or(set.template_id),
            custom_prompt: set.custom_prompt,
            trigger_phrase: set.trigger_phrase,
            max_length: set.max_length,
            seed: req.seed,
            seed_mode: req.seed_mode.unwrap_or_default(),
            overwrite_existing: req.overwrite_existing,
            status: JobStatus::Pending,
            total_files: total as i32,
            completed_files: 0,
            failed_files: 0,
            current_file_id: None,
            last_error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.store.create_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            caption_set_id = %set.id,
            backend = %job.backend,
            model = %job.model,
            total_files = job.total_files,
            overwrite = job.overwrite_existing,
            "Caption job created",
        );

        self.spawn_worker(job.id).await;
        Ok(job)
    }

    /// Respawn workers for jobs a previous process left pending or
    /// running. Paused jobs stay parked until an explicit resume. Returns
    /// the number of workers spawned.
    pub async fn recover(&self) -> Result<usize, CoreError> {
        let mut spawned = 0;
        for job in self.store.list_jobs(None).await? {
            if matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                tracing::info!(job_id = %job.id, status = %job.status, "Recovering caption job");
                self.spawn_worker(job.id).await;
                spawned += 1;
            }
        }
        Ok(spawned)
    }

    pub async fn get(&self, job_id: Id) -> Result<Job, CoreError> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("caption job", job_id))
    }

    /// List jobs, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>, CoreError> {
        self.store.list_jobs(status).await
    }

    /// Pause a running job. The worker parks on its next checkpoint.
    pub async fn pause(&self, job_id: Id) -> Result<Job, CoreError> {
        let job = self
            .store
            .transition_job(job_id, &[JobStatus::Running], JobStatus::Paused)
            .await?
            .ok_or_else(|| CoreError::not_found("caption job", job_id))?;
        tracing::info!(%job_id, status = %job.status, "Pause requested");
        Ok(job)
    }

    /// Resume a paused job with a fresh worker instance.
    pub async fn resume(&self, job_id: Id) -> Result<Job, CoreError> {
        let current = self.get(job_id).await?;
        if current.status != JobStatus::Paused {
            return Ok(current);
        }

        let job = self
            .store
            .transition_job(job_id, &[JobStatus::Paused], JobStatus::Running)
            .await?
            .ok_or_else(|| CoreError::not_found("caption job", job_id))?;
        if job.status == JobStatus::Running {
            tracing::info!(%job_id, "Resuming caption job");
            self.spawn_worker(job_id).await;
        }
        Ok(job)
    }

    /// Cancel a non-terminal job. The worker stops before its next file;
    /// an in-flight backend call is allowed to finish first.
    pub async fn cancel(&self, job_id: Id) -> Result<Job, CoreError> {
        let job = self
            .store
            .transition_job(
                job_id,
                &[JobStatus::Pending, JobStatus::Running, JobStatus::Paused],
                JobStatus::Cancelled,
            )
            .await?
            .ok_or_else(|| CoreError::not_found("caption job", job_id))?;
        tracing::info!(%job_id, status = %job.status, "Cancel requested");
        Ok(job)
    }

    /// Read-only polling feed of job progress snapshots, ending at the
    /// first terminal snapshot.
    pub fn stream_progress(&self, job_id: Id) -> impl Stream<Item = ProgressEvent> {
        progress::stream(self.store.clone(), job_id, self.poll_interval)
    }

    /// Stop accepting work and wait for running workers to park or finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        for run in self.runs.lock().await.values() {
            run.token.cancel();
        }
        self.tracker.wait().await;
    }

    async fn spawn_worker(&self, job_id: Id) {
        let mut runs = self.runs.lock().await;
        let previous = runs.remove(&job_id);
        if let Some(run) = &previous {
            run.token.cancel();
        }

        let pipeline = Arc::new(CaptionPipeline::new(
            self.registry.clone(),
            self.cfg.preprocess.clone(),
        ));
        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let handle = self.tracker.spawn(async move {
            // At most one worker touches a job at a time: an in-flight
            // predecessor may still finish and checkpoint its current file,
            // so wait for it to exit before recomputing the file list.
            if let Some(run) = previous {
                let _ = run.handle.await;
            }
            worker::run(store, pipeline, job_id, poll_interval, worker_token).await;
        });
        runs.insert(job_id, WorkerRun { token, handle });
    }
}
