//! Read access to collaborator-owned tables (`caption_sets`,
//! `dataset_files`, `tracked_files`), plus the quality write-back.

use sqlx::PgPool;

use capstudio_core::types::Id;

use crate::models::dataset::{CaptionSetRow, DatasetMemberRow};
use crate::models::flags_to_json;

pub struct DatasetRepo;

impl DatasetRepo {
    /// Find a caption set by its ID.
    pub async fn find_caption_set(
        pool: &PgPool,
        id: Id,
    ) -> Result<Option<CaptionSetRow>, sqlx::Error> {
        sqlx::query_as::<_, CaptionSetRow>(
            "SELECT id, dataset_id, style, template_id, custom_prompt, \
                    trigger_phrase, max_length \
             FROM caption_sets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Non-excluded members of a dataset in worker iteration order.
    pub async fn eligible_members(
        pool: &PgPool,
        dataset_id: Id,
    ) -> Result<Vec<DatasetMemberRow>, sqlx::Error> {
        sqlx::query_as::<_, DatasetMemberRow>(
            "SELECT file_id, order_index FROM dataset_files \
             WHERE dataset_id = $1 AND excluded = FALSE \
             ORDER BY order_index, file_id",
        )
        .bind(dataset_id)
        .fetch_all(pool)
        .await
    }

    /// Resolve a tracked file's absolute path.
    pub async fn resolve_path(
        pool: &PgPool,
        file_id: Id,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT absolute_path FROM tracked_files WHERE id = $1",
        )
        .bind(file_id)
        .fetch_optional(pool)
        .await
    }

    /// Write a caption's quality assessment back onto the membership row.
    /// No-op when the row is missing.
    pub async fn set_member_quality(
        pool: &PgPool,
        dataset_id: Id,
        file_id: Id,
        score: f64,
        flags: Option<&[String]>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE dataset_files \
             SET quality_score = $3, quality_flags = $4 \
             WHERE dataset_id = $1 AND file_id = $2",
        )
        .bind(dataset_id)
        .bind(file_id)
        .bind(score)
        .bind(flags_to_json(flags))
        .execute(pool)
        .await?;
        Ok(())
    }
}
