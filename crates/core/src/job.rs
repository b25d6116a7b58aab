//! Caption job, target set, and generated caption entities.

use serde::{Deserialize, Serialize};

use crate::prompt::CaptionStyle;
use crate::status::JobStatus;
use crate::types::{Id, Timestamp};

/// How the generation seed is applied across a job's files.
///
/// Stored on the job for provenance; the engine currently always sends the
/// job's fixed seed to the backend regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    Fixed,
    Random,
}

impl Default for SeedMode {
    fn default() -> Self {
        SeedMode::Fixed
    }
}

/// One batch request to auto-caption the files of a caption set.
///
/// Prompt-shaping fields (`style`, `template_id`, `custom_prompt`,
/// `trigger_phrase`, `max_length`) are snapshotted from the caption set at
/// creation time so a mid-run edit of the set cannot skew an active job.
///
/// Invariant: `completed_files + failed_files <= total_files` at all times.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Id,
    pub caption_set_id: Id,
    pub backend: String,
    pub model: String,
    pub style: CaptionStyle,
    pub template_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub trigger_phrase: Option<String>,
    pub max_length: Option<u32>,
    pub seed: Option<i64>,
    pub seed_mode: SeedMode,
    pub overwrite_existing: bool,
    pub status: JobStatus,
    pub total_files: i32,
    pub completed_files: i32,
    pub failed_files: i32,
    pub current_file_id: Option<Id>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Fraction of the batch processed so far, as a percentage rounded to
    /// one decimal place. Zero-file jobs report 0.0.
    pub fn percent_complete(&self) -> f64 {
        if self.total_files <= 0 {
            return 0.0;
        }
        let raw = self.completed_files as f64 / self.total_files as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }
}

/// A named collection of per-file caption records tied to a dataset.
///
/// Owned by the dataset collaborator; read-only to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct CaptionSet {
    pub id: Id,
    pub dataset_id: Id,
    pub style: CaptionStyle,
    pub template_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub trigger_phrase: Option<String>,
    pub max_length: Option<u32>,
}

/// A dataset membership entry eligible for captioning.
///
/// The store returns these already filtered to non-excluded files and
/// ordered by `(order_index, file_id)`, the deterministic order the worker
/// relies on across resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetMember {
    pub file_id: Id,
    pub order_index: i32,
}

/// A caption produced (or refreshed) by a job for one file.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedCaption {
    pub caption_set_id: Id,
    pub file_id: Id,
    pub text: String,
    pub caption_ru: Option<String>,
    /// Always `"generated"` for engine-produced captions.
    pub source: String,
    pub model: String,
    pub quality_score: Option<f64>,
    pub quality_flags: Option<Vec<String>>,
}

/// Parameters accepted by `JobController::create`.
///
/// Unset fields fall back to the caption set's values and then to the
/// configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateJob {
    pub caption_set_id: Id,
    pub backend: Option<String>,
    pub model: Option<String>,
    pub template_id: Option<String>,
    pub seed: Option<i64>,
    pub seed_mode: Option<SeedMode>,
    #[serde(default)]
    pub overwrite_existing: bool,
}
