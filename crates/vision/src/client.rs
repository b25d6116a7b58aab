//! HTTP client for the LM Studio OpenAI-compatible API.
//!
//! Wraps `/v1/chat/completions` (with and without an image) and
//! `/v1/models` using [`reqwest`]. Payload construction is kept in pure
//! functions so the request semantics are unit-testable.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use capstudio_core::config::VisionConfig;

/// Temperature when no seed is supplied: keep replies stable.
const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Temperature when a seed is supplied: raised so distinct seeds produce
/// intentional variability instead of near-identical replies.
const SEEDED_TEMPERATURE: f64 = 0.7;

/// Timeout for the lightweight `/v1/models` probe.
const MODELS_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a single OpenAI-compatible server.
#[derive(Debug)]
pub struct VisionClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_tokens: u32,
}

/// Errors from the vision HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum VisionApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Vision API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response envelope was missing the expected fields.
    #[error("Malformed vision API response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl VisionClient {
    /// Create a client from the vision configuration.
    pub fn from_config(cfg: &VisionConfig) -> Self {
        Self::new(
            cfg.lmstudio_url.clone(),
            Duration::from_secs(cfg.timeout_secs),
            cfg.max_tokens,
        )
    }

    /// Create a client targeting `base_url` (e.g. `http://host:1234`).
    pub fn new(base_url: String, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
            max_tokens,
        }
    }

    /// Base HTTP URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send an image + prompt completion request and return the raw reply
    /// text.
    pub async fn chat_image(
        &self,
        model: &str,
        prompt: &str,
        image: &[u8],
        mime: &str,
        seed: Option<i64>,
    ) -> Result<String, VisionApiError> {
        let encoded = BASE64.encode(image);
        let payload = chat_payload(model, prompt, Some((mime, &encoded)), seed, self.max_tokens);
        self.send_chat(payload).await
    }

    /// Send a text-only completion request (no image), used for
    /// translation.
    pub async fn chat_text(&self, model: &str, prompt: &str) -> Result<String, VisionApiError> {
        let payload = chat_payload(model, prompt, None, None, self.max_tokens);
        self.send_chat(payload).await
    }

    /// Fetch the ids of the models currently loaded in the backend.
    pub async fn list_models(&self) -> Result<Vec<String>, VisionApiError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(MODELS_TIMEOUT)
            .send()
            .await?;

        let parsed: ModelsResponse = Self::ensure_success(response).await?.json().await?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    // ---- private helpers ----

    async fn send_chat(&self, payload: serde_json::Value) -> Result<String, VisionApiError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let parsed: ChatResponse = Self::ensure_success(response).await?.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VisionApiError::Malformed("response has no choices".into()))?;
        Ok(choice.message.content)
    }

    /// Ensure the response has a success status code, or return a
    /// [`VisionApiError::Api`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, VisionApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VisionApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Build a `/v1/chat/completions` request body.
///
/// When a seed is supplied it is sent both as the `seed` field and embedded
/// textually as a `[<seed>] ` prompt prefix, since some backends cache replies
/// by identical prompt + image, which would defeat reseeding otherwise.
pub fn chat_payload(
    model: &str,
    prompt: &str,
    image: Option<(&str, &str)>,
    seed: Option<i64>,
    max_tokens: u32,
) -> serde_json::Value {
    let temperature = if seed.is_some() {
        SEEDED_TEMPERATURE
    } else {
        DEFAULT_TEMPERATURE
    };

    let prompt_text = match seed {
        Some(seed) => format!("[{seed}] {prompt}"),
        None => prompt.to_string(),
    };

    let content = match image {
        Some((mime, base64_data)) => serde_json::json!([
            { "type": "text", "text": prompt_text },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{mime};base64,{base64_data}") }
            }
        ]),
        None => serde_json::Value::String(prompt_text),
    };

    let mut payload = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": max_tokens,
        "temperature": temperature,
    });

    if let Some(seed) = seed {
        payload["seed"] = serde_json::json!(seed);
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_uses_default_temperature() {
        let payload = chat_payload("m", "describe", None, None, 1024);
        assert_eq!(payload["temperature"], serde_json::json!(0.3));
        assert_eq!(payload["max_tokens"], serde_json::json!(1024));
        assert_eq!(payload["messages"][0]["content"], "describe");
        assert!(payload.get("seed").is_none());
    }

    #[test]
    fn seeded_payload_raises_temperature_and_embeds_seed() {
        let payload = chat_payload("m", "describe", None, Some(42), 1024);
        assert_eq!(payload["temperature"], serde_json::json!(0.7));
        assert_eq!(payload["seed"], serde_json::json!(42));
        assert_eq!(payload["messages"][0]["content"], "[42] describe");
    }

    #[test]
    fn image_payload_carries_data_uri() {
        let payload = chat_payload("m", "p", Some(("image/jpeg", "QUJD")), None, 512);
        let parts = payload["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "p");
        assert_eq!(
            parts[1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn seeded_image_payload_prefixes_the_text_part() {
        let payload = chat_payload("m", "p", Some(("image/png", "QUJD")), Some(7), 512);
        let parts = payload["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "[7] p");
    }
}
