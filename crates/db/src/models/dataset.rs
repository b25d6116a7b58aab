//! Caption set and dataset membership row models (collaborator-owned).

use sqlx::FromRow;

use capstudio_core::job::{CaptionSet, DatasetMember};
use capstudio_core::prompt::CaptionStyle;
use capstudio_core::types::Id;

/// A row from the `caption_sets` table.
#[derive(Debug, Clone, FromRow)]
pub struct CaptionSetRow {
    pub id: Id,
    pub dataset_id: Id,
    pub style: String,
    pub template_id: Option<String>,
    pub custom_prompt: Option<String>,
    pub trigger_phrase: Option<String>,
    pub max_length: Option<i32>,
}

impl From<CaptionSetRow> for CaptionSet {
    fn from(row: CaptionSetRow) -> CaptionSet {
        CaptionSet {
            id: row.id,
            dataset_id: row.dataset_id,
            style: CaptionStyle::parse(&row.style),
            template_id: row.template_id,
            custom_prompt: row.custom_prompt,
            trigger_phrase: row.trigger_phrase,
            max_length: row.max_length.map(|v| v.max(0) as u32),
        }
    }
}

/// A row from the `dataset_files` ordering query.
#[derive(Debug, Clone, FromRow)]
pub struct DatasetMemberRow {
    pub file_id: Id,
    pub order_index: i32,
}

impl From<DatasetMemberRow> for DatasetMember {
    fn from(row: DatasetMemberRow) -> DatasetMember {
        DatasetMember {
            file_id: row.file_id,
            order_index: row.order_index,
        }
    }
}
