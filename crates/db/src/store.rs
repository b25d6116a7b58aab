//! [`PgStore`]: the Postgres implementation of the engine's store traits.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use capstudio_core::error::CoreError;
use capstudio_core::job::{CaptionSet, DatasetMember, GeneratedCaption, Job};
use capstudio_core::status::JobStatus;
use capstudio_core::store::{CaptionStore, DatasetStore, JobStore};
use capstudio_core::types::Id;

use crate::repositories::{CaptionRepo, DatasetRepo, JobRepo};

/// Production store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Database failures are internal errors at the engine boundary.
fn db_err(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("Database error: {err}"))
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: &Job) -> Result<(), CoreError> {
        JobRepo::create(&self.pool, job).await.map_err(db_err)
    }

    async fn find_job(&self, id: Id) -> Result<Option<Job>, CoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(Job::try_from)
            .transpose()
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, CoreError> {
        JobRepo::list(&self.pool, status)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    async fn transition_job(
        &self,
        id: Id,
        from: &[JobStatus],
        to: JobStatus,
    ) -> Result<Option<Job>, CoreError> {
        let updated = JobRepo::transition(&self.pool, id, from, to)
            .await
            .map_err(db_err)?;
        match updated {
            Some(row) => Ok(Some(Job::try_from(row)?)),
            // Guard did not hold; report the unchanged job.
            None => self.find_job(id).await,
        }
    }

    async fn mark_job_started(&self, id: Id) -> Result<(), CoreError> {
        JobRepo::mark_started(&self.pool, id).await.map_err(db_err)
    }

    async fn set_current_file(&self, id: Id, file_id: Option<Id>) -> Result<(), CoreError> {
        JobRepo::set_current_file(&self.pool, id, file_id)
            .await
            .map_err(db_err)
    }

    async fn update_job_counters(
        &self,
        id: Id,
        completed: i32,
        failed: i32,
        last_error: Option<&str>,
    ) -> Result<(), CoreError> {
        JobRepo::update_counters(&self.pool, id, completed, failed, last_error)
            .await
            .map_err(db_err)
    }

    async fn fail_job(&self, id: Id, error: &str) -> Result<(), CoreError> {
        JobRepo::fail(&self.pool, id, error).await.map_err(db_err)
    }
}

#[async_trait]
impl CaptionStore for PgStore {
    async fn upsert_caption(&self, caption: &GeneratedCaption) -> Result<(), CoreError> {
        CaptionRepo::upsert(&self.pool, caption).await.map_err(db_err)
    }

    async fn find_caption(
        &self,
        caption_set_id: Id,
        file_id: Id,
    ) -> Result<Option<GeneratedCaption>, CoreError> {
        Ok(CaptionRepo::find(&self.pool, caption_set_id, file_id)
            .await
            .map_err(db_err)?
            .map(GeneratedCaption::from))
    }

    async fn captioned_file_ids(&self, caption_set_id: Id) -> Result<Vec<Id>, CoreError> {
        CaptionRepo::file_ids(&self.pool, caption_set_id)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl DatasetStore for PgStore {
    async fn find_caption_set(&self, id: Id) -> Result<Option<CaptionSet>, CoreError> {
        Ok(DatasetRepo::find_caption_set(&self.pool, id)
            .await
            .map_err(db_err)?
            .map(CaptionSet::from))
    }

    async fn eligible_members(&self, dataset_id: Id) -> Result<Vec<DatasetMember>, CoreError> {
        Ok(DatasetRepo::eligible_members(&self.pool, dataset_id)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DatasetMember::from)
            .collect())
    }

    async fn resolve_path(&self, file_id: Id) -> Result<Option<PathBuf>, CoreError> {
        Ok(DatasetRepo::resolve_path(&self.pool, file_id)
            .await
            .map_err(db_err)?
            .map(PathBuf::from))
    }

    async fn set_member_quality(
        &self,
        dataset_id: Id,
        file_id: Id,
        score: f64,
        flags: Option<&[String]>,
    ) -> Result<(), CoreError> {
        DatasetRepo::set_member_quality(&self.pool, dataset_id, file_id, score, flags)
            .await
            .map_err(db_err)
    }
}
