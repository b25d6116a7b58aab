//! One captioning attempt for one file.
//!
//! The pipeline composes preprocessing, prompt assembly, the backend call,
//! and response parsing. It is stateless across files except for the
//! per-job resize cache handed in by the worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use capstudio_core::config::PreprocessConfig;
use capstudio_core::error::CoreError;
use capstudio_core::job::Job;
use capstudio_core::parser::parse_response;
use capstudio_core::preprocess::preprocess_image;
use capstudio_core::prompt::{build_prompt, PromptSpec};
use capstudio_core::store::Store;
use capstudio_core::types::Id;
use capstudio_vision::backend::{BackendRegistry, GenerateRequest, ImagePayload};

/// Per-job cache of preprocessed image bytes keyed by file id.
///
/// Scoped to one worker run: created empty at job start, dropped at job
/// end, never persisted. Saves re-encoding when a pause/resume cycle
/// revisits a file within the same run.
#[derive(Default)]
pub struct ResizeCache {
    entries: HashMap<Id, Vec<u8>>,
}

impl ResizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The parsed result of one successful captioning attempt.
#[derive(Debug, Clone)]
pub struct CaptionOutcome {
    pub caption: String,
    pub caption_ru: Option<String>,
    pub quality_score: Option<f64>,
    pub quality_flags: Option<Vec<String>>,
    pub duration_ms: u64,
    /// Model and backend the attempt actually ran against.
    pub model: String,
    pub backend: String,
}

/// Composes preprocessing, prompt, backend call, and parsing.
pub struct CaptionPipeline {
    registry: Arc<dyn BackendRegistry>,
    preprocess: PreprocessConfig,
}

impl CaptionPipeline {
    pub fn new(registry: Arc<dyn BackendRegistry>, preprocess: PreprocessConfig) -> Self {
        Self {
            registry,
            preprocess,
        }
    }

    /// Caption one file for `job`.
    ///
    /// Errors here are per-file: the worker records them and moves on.
    pub async fn caption_file<S>(
        &self,
        store: &S,
        job: &Job,
        file_id: Id,
        cache: &mut ResizeCache,
    ) -> Result<CaptionOutcome, CoreError>
    where
        S: Store + ?Sized,
    {
        let started = Instant::now();

        let encoded = match cache.entries.get(&file_id) {
            Some(bytes) => bytes.clone(),
            None => {
                let path = store
                    .resolve_path(file_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("file", file_id))?;
                let raw = tokio::fs::read(&path).await.map_err(|e| {
                    CoreError::Internal(format!(
                        "Failed to read image file {}: {e}",
                        path.display()
                    ))
                })?;
                let encoded = preprocess_image(raw, &self.preprocess);
                cache.entries.insert(file_id, encoded.clone());
                encoded
            }
        };

        let prompt = build_prompt(&PromptSpec {
            style: Some(job.style),
            max_length: job.max_length,
            custom_prompt: job.custom_prompt.as_deref(),
            trigger_phrase: job.trigger_phrase.as_deref(),
            template_id: job.template_id.as_deref(),
        });

        let backend = self.registry.resolve(&job.backend)?;
        let raw_reply = backend
            .generate(GenerateRequest {
                model: &job.model,
                prompt: &prompt,
                image: Some(ImagePayload {
                    bytes: &encoded,
                    mime: self.preprocess.format.mime_type(),
                }),
                seed: job.seed,
            })
            .await?;

        let parsed = parse_response(&raw_reply);
        let caption = match job.trigger_phrase.as_deref().filter(|p| !p.is_empty()) {
            Some(phrase) => apply_trigger_phrase(&parsed.caption, phrase),
            None => parsed.caption,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            job_id = %job.id,
            file_id = %file_id,
            duration_ms,
            chars = caption.len(),
            "Captioned file",
        );

        Ok(CaptionOutcome {
            caption,
            caption_ru: parsed.caption_ru,
            quality_score: parsed.quality_score,
            quality_flags: parsed.quality_flags,
            duration_ms,
            model: job.model.clone(),
            backend: backend.id().to_string(),
        })
    }
}

/// Models are instructed to open with the trigger phrase but do not always
/// comply; prepend it when missing. An empty caption stays empty, and a
/// caption that already starts with a comma gets the phrase glued on
/// without a second separator.
fn apply_trigger_phrase(caption: &str, phrase: &str) -> String {
    if caption.is_empty() {
        return String::new();
    }
    if caption
        .to_lowercase()
        .starts_with(&phrase.to_lowercase())
    {
        return caption.to_string();
    }
    if caption.starts_with(',') {
        format!("{phrase}{caption}")
    } else {
        format!("{phrase}, {caption}")
    }
}
