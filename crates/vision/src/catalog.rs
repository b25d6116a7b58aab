//! Vision model discovery.
//!
//! Prefers the backend's live `/v1/models` listing; falls back to a curated
//! catalog of models with known-good captioning performance when the
//! backend is unreachable or reports nothing.

use serde::Serialize;

use crate::backend::BACKEND_LMSTUDIO;
use crate::client::VisionClient;

/// A curated model with known resource requirements.
struct CuratedModel {
    model_id: &'static str,
    name: &'static str,
    backend_model_name: &'static str,
    vram_gb: f32,
    description: &'static str,
}

/// Curated vision models with known good captioning performance.
const CURATED_MODELS: &[CuratedModel] = &[
    CuratedModel {
        model_id: "qwen2.5-vl-7b",
        name: "Qwen2.5-VL 7B",
        backend_model_name: "qwen/qwen2.5-vl-7b-instruct",
        vram_gb: 8.0,
        description: "Excellent quality, good speed. Recommended for most users.",
    },
    CuratedModel {
        model_id: "qwen2.5-vl-3b",
        name: "Qwen2.5-VL 3B",
        backend_model_name: "qwen/qwen2.5-vl-3b-instruct",
        vram_gb: 4.0,
        description: "Fast and lightweight. Good for quick iterations.",
    },
    CuratedModel {
        model_id: "llava-1.6-34b",
        name: "LLaVA 1.6 34B",
        backend_model_name: "liuhaotian/llava-v1.6-34b",
        vram_gb: 24.0,
        description: "Highest quality, requires significant VRAM.",
    },
    CuratedModel {
        model_id: "llava-1.6-13b",
        name: "LLaVA 1.6 13B",
        backend_model_name: "liuhaotian/llava-v1.6-13b",
        vram_gb: 12.0,
        description: "Good balance of quality and speed.",
    },
    CuratedModel {
        model_id: "llava-1.6-7b",
        name: "LLaVA 1.6 7B",
        backend_model_name: "liuhaotian/llava-v1.6-7b",
        vram_gb: 6.0,
        description: "Efficient option for lower VRAM systems.",
    },
];

/// A model offered to the user, live or curated.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub name: String,
    pub backend: String,
    pub backend_model_name: String,
    pub is_available: bool,
    pub vram_gb: Option<f32>,
    pub description: String,
}

/// List available vision models.
///
/// Models reported live by the backend are returned as-is. When the
/// listing fails or comes back empty, the curated catalog is returned with
/// availability marked from whatever the probe managed to see.
pub async fn list_models(client: &VisionClient) -> Vec<ModelInfo> {
    let live = match client.list_models().await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::debug!(error = %e, "Could not fetch live model list");
            Vec::new()
        }
    };

    if !live.is_empty() {
        tracing::info!(count = live.len(), "Found live models in backend");
        return live
            .into_iter()
            .map(|id| {
                let name = id.rsplit('/').next().unwrap_or(&id).to_string();
                ModelInfo {
                    model_id: id.clone(),
                    name,
                    backend: BACKEND_LMSTUDIO.to_string(),
                    backend_model_name: id,
                    is_available: true,
                    vram_gb: None,
                    description: "Loaded in LM Studio".to_string(),
                }
            })
            .collect();
    }

    tracing::debug!("No models from API, falling back to curated list");
    CURATED_MODELS
        .iter()
        .map(|model| ModelInfo {
            model_id: model.model_id.to_string(),
            name: model.name.to_string(),
            backend: BACKEND_LMSTUDIO.to_string(),
            backend_model_name: model.backend_model_name.to_string(),
            is_available: false,
            vram_gb: Some(model.vram_gb),
            description: model.description.to_string(),
        })
        .collect()
}
