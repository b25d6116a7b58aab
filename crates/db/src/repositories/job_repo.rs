//! Repository for the `caption_jobs` table.
//!
//! Uses `JobStatus` from `capstudio-core` for all status transitions.
//! No magic numbers: every status literal is a named constant.

use sqlx::PgPool;

use capstudio_core::job::Job;
use capstudio_core::status::{JobStatus, StatusId};
use capstudio_core::types::Id;

use crate::models::job::{seed_mode_str, JobRow};

/// Column list for `caption_jobs` queries.
const COLUMNS: &str = "\
    id, caption_set_id, backend, model, style, template_id, custom_prompt, \
    trigger_phrase, max_length, seed, seed_mode, overwrite_existing, \
    status_id, total_files, completed_files, failed_files, \
    current_file_id, last_error, created_at, started_at, completed_at";

/// Provides CRUD operations for caption jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a freshly created job row.
    pub async fn create(pool: &PgPool, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO caption_jobs \
                 (id, caption_set_id, backend, model, style, template_id, \
                  custom_prompt, trigger_phrase, max_length, seed, seed_mode, \
                  overwrite_existing, status_id, total_files, completed_files, \
                  failed_files, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17)",
        )
        .bind(job.id)
        .bind(job.caption_set_id)
        .bind(&job.backend)
        .bind(&job.model)
        .bind(job.style.as_str())
        .bind(&job.template_id)
        .bind(&job.custom_prompt)
        .bind(&job.trigger_phrase)
        .bind(job.max_length.map(|v| v as i32))
        .bind(job.seed)
        .bind(seed_mode_str(job.seed_mode))
        .bind(job.overwrite_existing)
        .bind(job.status.id())
        .bind(job.total_files)
        .bind(job.completed_files)
        .bind(job.failed_files)
        .bind(job.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: Id) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM caption_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs newest-first, optionally filtered by status.
    pub async fn list(
        pool: &PgPool,
        status: Option<JobStatus>,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        match status {
            Some(status) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM caption_jobs \
                     WHERE status_id = $1 ORDER BY created_at DESC"
                );
                sqlx::query_as::<_, JobRow>(&query)
                    .bind(status.id())
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query =
                    format!("SELECT {COLUMNS} FROM caption_jobs ORDER BY created_at DESC");
                sqlx::query_as::<_, JobRow>(&query).fetch_all(pool).await
            }
        }
    }

    /// Guarded status transition, applied only when the current status is
    /// in `from`. Returns the updated row, or `None` when the guard did
    /// not hold (the caller re-fetches for the unchanged view).
    ///
    /// Transitions into a terminal status also set `completed_at`.
    pub async fn transition(
        pool: &PgPool,
        id: Id,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let from_ids: Vec<StatusId> = from.iter().map(|s| s.id()).collect();
        let query = format!(
            "UPDATE caption_jobs \
             SET status_id = $2, \
                 completed_at = CASE WHEN $3 THEN NOW() ELSE completed_at END \
             WHERE id = $1 AND status_id = ANY($4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .bind(to.id())
            .bind(to.is_terminal())
            .bind(&from_ids)
            .fetch_optional(pool)
            .await
    }

    /// Move the job to running, setting `started_at` only on the first run.
    /// Leaves the row alone when the job was cancelled before the worker
    /// got scheduled.
    pub async fn mark_started(pool: &PgPool, id: Id) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE caption_jobs \
             SET status_id = $2, started_at = COALESCE(started_at, NOW()) \
             WHERE id = $1 AND status_id = ANY($3)",
        )
        .bind(id)
        .bind(JobStatus::Running.id())
        .bind(vec![JobStatus::Pending.id(), JobStatus::Running.id()])
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Point the job at the file currently being processed.
    pub async fn set_current_file(
        pool: &PgPool,
        id: Id,
        file_id: Option<Id>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE caption_jobs SET current_file_id = $2 WHERE id = $1")
            .bind(id)
            .bind(file_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Persist the per-file durability checkpoint.
    pub async fn update_counters(
        pool: &PgPool,
        id: Id,
        completed: i32,
        failed: i32,
        last_error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE caption_jobs \
             SET completed_files = $2, failed_files = $3, \
                 last_error = COALESCE($4, last_error) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(completed)
        .bind(failed)
        .bind(last_error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminate the job as failed, recording the error.
    pub async fn fail(pool: &PgPool, id: Id, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE caption_jobs \
             SET status_id = $2, last_error = $3, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
