//! The `VisionBackend` seam between the engine and concrete servers.
//!
//! One backend identity is active per call; the registry resolves a
//! backend id string (overridable per request/job) to an implementation
//! and rejects unknown ids with `CoreError::Invalid`.

use std::sync::Arc;

use async_trait::async_trait;

use capstudio_core::config::VisionConfig;
use capstudio_core::error::CoreError;

use crate::client::{VisionApiError, VisionClient};

/// Backend id of the LM Studio implementation.
pub const BACKEND_LMSTUDIO: &str = "lmstudio";

/// An image payload ready for transmission.
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub bytes: &'a [u8],
    pub mime: &'a str,
}

/// One caption (or text-only) generation request.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// `None` selects the text-only call path (translation use).
    pub image: Option<ImagePayload<'a>>,
    pub seed: Option<i64>,
}

/// A pluggable vision-language backend returning raw reply text.
#[async_trait]
pub trait VisionBackend: std::fmt::Debug + Send + Sync {
    /// Stable backend identifier (e.g. `lmstudio`).
    fn id(&self) -> &'static str;

    /// Run one generation request to completion or timeout.
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, CoreError>;
}

/// LM Studio (OpenAI-compatible local server) backend.
#[derive(Debug)]
pub struct LmStudioBackend {
    client: VisionClient,
}

impl LmStudioBackend {
    pub fn from_config(cfg: &VisionConfig) -> Self {
        Self {
            client: VisionClient::from_config(cfg),
        }
    }

    pub fn new(client: VisionClient) -> Self {
        Self { client }
    }

    /// Borrow the underlying HTTP client (model listing, translation).
    pub fn client(&self) -> &VisionClient {
        &self.client
    }
}

#[async_trait]
impl VisionBackend for LmStudioBackend {
    fn id(&self) -> &'static str {
        BACKEND_LMSTUDIO
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, CoreError> {
        let result = match request.image {
            Some(image) => {
                self.client
                    .chat_image(
                        request.model,
                        request.prompt,
                        image.bytes,
                        image.mime,
                        request.seed,
                    )
                    .await
            }
            None => self.client.chat_text(request.model, request.prompt).await,
        };
        result.map_err(unavailable)
    }
}

/// Every failure mode of the HTTP layer means the backend could not serve
/// this request; the body (or transport error) rides along for inspection.
pub(crate) fn unavailable(err: VisionApiError) -> CoreError {
    CoreError::Unavailable(err.to_string())
}

/// Resolves backend id strings to live backends.
pub trait BackendRegistry: Send + Sync {
    fn resolve(&self, id: &str) -> Result<Arc<dyn VisionBackend>, CoreError>;
}

/// Registry over the configured backends. LM Studio is currently the only
/// supported identity.
pub struct DefaultBackendRegistry {
    lmstudio: Arc<LmStudioBackend>,
}

impl DefaultBackendRegistry {
    pub fn from_config(cfg: &VisionConfig) -> Self {
        Self {
            lmstudio: Arc::new(LmStudioBackend::from_config(cfg)),
        }
    }
}

impl BackendRegistry for DefaultBackendRegistry {
    fn resolve(&self, id: &str) -> Result<Arc<dyn VisionBackend>, CoreError> {
        match id {
            BACKEND_LMSTUDIO => Ok(self.lmstudio.clone()),
            other => Err(CoreError::Invalid(format!(
                "Unknown or unsupported backend: {other}"
            ))),
        }
    }
}
