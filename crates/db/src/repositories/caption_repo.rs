//! Repository for the `captions` table.

use sqlx::PgPool;

use capstudio_core::job::GeneratedCaption;
use capstudio_core::types::Id;

use crate::models::caption::CaptionRow;
use crate::models::flags_to_json;

/// Provides upsert and lookup operations for generated captions.
pub struct CaptionRepo;

impl CaptionRepo {
    /// Insert or update the caption for `(caption_set_id, file_id)`.
    ///
    /// A retry that produced no Russian caption keeps the previous one
    /// rather than erasing it.
    pub async fn upsert(pool: &PgPool, caption: &GeneratedCaption) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO captions \
                 (caption_set_id, file_id, text, caption_ru, source, model, \
                  quality_score, quality_flags) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (caption_set_id, file_id) DO UPDATE SET \
                 text = EXCLUDED.text, \
                 caption_ru = COALESCE(EXCLUDED.caption_ru, captions.caption_ru), \
                 source = EXCLUDED.source, \
                 model = EXCLUDED.model, \
                 quality_score = EXCLUDED.quality_score, \
                 quality_flags = EXCLUDED.quality_flags, \
                 updated_at = NOW()",
        )
        .bind(caption.caption_set_id)
        .bind(caption.file_id)
        .bind(&caption.text)
        .bind(&caption.caption_ru)
        .bind(&caption.source)
        .bind(&caption.model)
        .bind(caption.quality_score)
        .bind(flags_to_json(caption.quality_flags.as_deref()))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find the caption for one file in a set.
    pub async fn find(
        pool: &PgPool,
        caption_set_id: Id,
        file_id: Id,
    ) -> Result<Option<CaptionRow>, sqlx::Error> {
        sqlx::query_as::<_, CaptionRow>(
            "SELECT caption_set_id, file_id, text, caption_ru, source, model, \
                    quality_score, quality_flags, created_at, updated_at \
             FROM captions WHERE caption_set_id = $1 AND file_id = $2",
        )
        .bind(caption_set_id)
        .bind(file_id)
        .fetch_optional(pool)
        .await
    }

    /// File ids that already have a caption in the set.
    pub async fn file_ids(pool: &PgPool, caption_set_id: Id) -> Result<Vec<Id>, sqlx::Error> {
        sqlx::query_scalar::<_, Id>(
            "SELECT file_id FROM captions WHERE caption_set_id = $1",
        )
        .bind(caption_set_id)
        .fetch_all(pool)
        .await
    }
}
