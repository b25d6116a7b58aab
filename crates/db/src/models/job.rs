//! Caption job row model.

use sqlx::FromRow;

use capstudio_core::error::CoreError;
use capstudio_core::job::{Job, SeedMode};
use capstudio_core::prompt::CaptionStyle;
use capstudio_core::status::{JobStatus, StatusId};
use capstudio_core::types::{Id, Timestamp};

/// A row from the `caption_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Id,
    pub caption_set_id: Id,
    pub backend: String,
    pub model: String,
    pub style: String,
    pub template_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub trigger_phrase: Option<String>,
    pub max_length: Option<i32>,
    pub seed: Option<i64>,
    pub seed_mode: String,
    pub overwrite_existing: bool,
    pub status_id: StatusId,
    pub total_files: i32,
    pub completed_files: i32,
    pub failed_files: i32,
    pub current_file_id: Option<Id>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Job, CoreError> {
        let status = JobStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "Job {} has unknown status id {}",
                row.id, row.status_id
            ))
        })?;

        let seed_mode = match row.seed_mode.as_str() {
            "random" => SeedMode::Random,
            _ => SeedMode::Fixed,
        };

        Ok(Job {
            id: row.id,
            caption_set_id: row.caption_set_id,
            backend: row.backend,
            model: row.model,
            style: CaptionStyle::parse(&row.style),
            template_id: row.template_id,
            custom_prompt: row.custom_prompt,
            trigger_phrase: row.trigger_phrase,
            max_length: row.max_length.map(|v| v.max(0) as u32),
            seed: row.seed,
            seed_mode,
            overwrite_existing: row.overwrite_existing,
            status,
            total_files: row.total_files,
            completed_files: row.completed_files,
            failed_files: row.failed_files,
            current_file_id: row.current_file_id,
            last_error: row.last_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Lowercase wire value for a seed mode.
pub fn seed_mode_str(mode: SeedMode) -> &'static str {
    match mode {
        SeedMode::Fixed => "fixed",
        SeedMode::Random => "random",
    }
}
