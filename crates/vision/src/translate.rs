//! RU <-> EN caption translation over the text-only call path.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use capstudio_core::error::CoreError;

use crate::backend::unavailable;
use crate::client::VisionClient;

/// Translation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    RuToEn,
    EnToRu,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::RuToEn
    }
}

/// A completed translation.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub translated_text: String,
    pub processing_time_ms: u64,
    pub model: String,
    pub direction: Direction,
}

/// Translate `text` using the given model, cleaning up the reply.
pub async fn translate_text(
    client: &VisionClient,
    model: &str,
    text: &str,
    direction: Direction,
) -> Result<Translation, CoreError> {
    let started = Instant::now();
    let prompt = translation_prompt(text, direction);

    let reply = client.chat_text(model, &prompt).await.map_err(unavailable)?;

    Ok(Translation {
        translated_text: cleanup_reply(&reply).to_string(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        model: model.to_string(),
        direction,
    })
}

/// Build the fixed translator prompt for a direction.
pub fn translation_prompt(text: &str, direction: Direction) -> String {
    match direction {
        Direction::EnToRu => format!(
            "You are a professional translator. Translate the following English text to Russian. \n\
             Provide ONLY the translation, no explanations, no quotes, no extra text.\n\
             Maintain the style and tone of the original description.\n\n\
             English text:\n{text}\n\nRussian translation:"
        ),
        Direction::RuToEn => format!(
            "You are a professional translator. Translate the following Russian text to English. \n\
             Provide ONLY the translation, no explanations, no quotes, no extra text.\n\
             Maintain the style and tone of the original description.\n\n\
             Russian text:\n{text}\n\nEnglish translation:"
        ),
    }
}

/// Trim whitespace and strip one layer of wrapping quotes (models often
/// quote the translation despite instructions).
fn cleanup_reply(reply: &str) -> &str {
    let trimmed = reply.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
