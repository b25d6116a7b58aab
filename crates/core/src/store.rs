//! Collaborator interfaces consumed by the engine.
//!
//! The engine never talks to a database directly: it sees persistence as
//! these traits. `capstudio-db` provides the Postgres implementation; tests
//! use an in-memory one.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::job::{CaptionSet, DatasetMember, GeneratedCaption, Job};
use crate::status::JobStatus;
use crate::types::Id;

/// Persistence for job records and their progress checkpoints.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<(), CoreError>;

    async fn find_job(&self, id: Id) -> Result<Option<Job>, CoreError>;

    /// List jobs, newest first, optionally filtered by status.
    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, CoreError>;

    /// Guarded status transition: applied only when the job's current status
    /// is one of `from`. Returns the job after the attempt (changed when
    /// the guard held, untouched otherwise) or `None` if the job is
    /// missing. Transitions into a terminal status set `completed_at`.
    async fn transition_job(
        &self,
        id: Id,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<Option<Job>, CoreError>;

    /// Set `started_at` (first run only) and move a pending or running job
    /// to running. No-op for any other status, so a job cancelled before
    /// its worker got scheduled stays cancelled.
    async fn mark_job_started(&self, id: Id) -> Result<(), CoreError>;

    /// Point the job at the file currently being processed.
    async fn set_current_file(&self, id: Id, file_id: Option<Id>) -> Result<(), CoreError>;

    /// Durability checkpoint: persist absolute counters and the last error.
    async fn update_job_counters(
        &self,
        id: Id,
        completed: i32,
        failed: i32,
        last_error: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Terminate the job as failed, recording the error.
    async fn fail_job(&self, id: Id, error: &str) -> Result<(), CoreError>;
}

/// Persistence for generated captions within a caption set.
#[async_trait]
pub trait CaptionStore: Send + Sync {
    /// Insert or update the caption for `(caption_set_id, file_id)`.
    async fn upsert_caption(&self, caption: &GeneratedCaption) -> Result<(), CoreError>;

    async fn find_caption(
        &self,
        caption_set_id: Id,
        file_id: Id,
    ) -> Result<Option<GeneratedCaption>, CoreError>;

    /// File ids that already have a caption in the set.
    async fn captioned_file_ids(&self, caption_set_id: Id) -> Result<Vec<Id>, CoreError>;
}

/// Read-only access to caption sets, dataset membership, and file paths.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn find_caption_set(&self, id: Id) -> Result<Option<CaptionSet>, CoreError>;

    /// Non-excluded members of a dataset, ordered by `(order_index,
    /// file_id)`. The ordering must be stable across calls: the worker
    /// recomputes this list on resume and skips a prefix of it.
    async fn eligible_members(&self, dataset_id: Id) -> Result<Vec<DatasetMember>, CoreError>;

    /// Resolve a file id to its absolute path. `None` when the record is
    /// missing; an existing record may still point at a vanished file.
    async fn resolve_path(&self, file_id: Id) -> Result<Option<PathBuf>, CoreError>;

    /// Propagate a caption's quality assessment onto the paired dataset
    /// membership record. No-op when the membership row is missing.
    async fn set_member_quality(
        &self,
        dataset_id: Id,
        file_id: Id,
        score: f64,
        flags: Option<&[String]>,
    ) -> Result<(), CoreError>;
}

/// Everything the engine needs from persistence, in one bound.
pub trait Store: JobStore + CaptionStore + DatasetStore {}

impl<T: JobStore + CaptionStore + DatasetStore> Store for T {}
