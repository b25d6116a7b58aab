//! Generated caption row model.

use sqlx::FromRow;

use capstudio_core::job::GeneratedCaption;
use capstudio_core::types::{Id, Timestamp};

use super::flags_from_json;

/// A row from the `captions` table.
#[derive(Debug, Clone, FromRow)]
pub struct CaptionRow {
    pub caption_set_id: Id,
    pub file_id: Id,
    pub text: String,
    pub caption_ru: Option<String>,
    pub source: String,
    pub model: Option<String>,
    pub quality_score: Option<f64>,
    pub quality_flags: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<CaptionRow> for GeneratedCaption {
    fn from(row: CaptionRow) -> GeneratedCaption {
        GeneratedCaption {
            caption_set_id: row.caption_set_id,
            file_id: row.file_id,
            text: row.text,
            caption_ru: row.caption_ru,
            source: row.source,
            model: row.model.unwrap_or_default(),
            quality_score: row.quality_score,
            quality_flags: flags_from_json(row.quality_flags),
        }
    }
}
