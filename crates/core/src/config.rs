//! Vision backend and preprocessing configuration.
//!
//! All fields have sensible defaults suitable for local development.
//! In production, override via environment variables.

/// Re-encode target for preprocessed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Webp,
    Png,
}

impl OutputFormat {
    /// Parse a format name, falling back to JPEG for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "webp" => OutputFormat::Webp,
            "png" => OutputFormat::Png,
            _ => OutputFormat::Jpeg,
        }
    }

    /// Whether the format can represent an alpha channel. Formats without
    /// alpha get transparency flattened onto white during preprocessing.
    pub fn supports_alpha(self) -> bool {
        matches!(self, OutputFormat::Webp | OutputFormat::Png)
    }

    /// MIME type used in the base64 data URI sent to the backend.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Image preprocessing settings for vision model transmission.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest-side ceiling in pixels; larger images are downscaled.
    pub max_resolution: u32,
    /// Re-encode quality for lossy formats (1-100).
    pub quality: u8,
    /// Target encoding format.
    pub format: OutputFormat,
    /// When false, downscaled images are forced square.
    pub maintain_aspect_ratio: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_resolution: 1024,
            quality: 85,
            format: OutputFormat::Jpeg,
            maintain_aspect_ratio: true,
        }
    }
}

/// Vision backend configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Active backend id (default: `lmstudio`).
    pub backend: String,
    /// Base URL of the LM Studio OpenAI-compatible server.
    pub lmstudio_url: String,
    /// Model used when a job does not name one.
    pub default_model: String,
    /// Per-request timeout for backend calls, in seconds.
    pub timeout_secs: u64,
    /// Token budget passed to the backend.
    pub max_tokens: u32,
    /// Image preprocessing settings.
    pub preprocess: PreprocessConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            backend: "lmstudio".into(),
            lmstudio_url: "http://localhost:1234".into(),
            default_model: "qwen/qwen2.5-vl-7b-instruct".into(),
            timeout_secs: 120,
            max_tokens: 1024,
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl VisionConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                         |
    /// |------------------------------|---------------------------------|
    /// | `VISION_BACKEND`             | `lmstudio`                      |
    /// | `VISION_LMSTUDIO_URL`        | `http://localhost:1234`         |
    /// | `VISION_DEFAULT_MODEL`       | `qwen/qwen2.5-vl-7b-instruct`   |
    /// | `VISION_TIMEOUT_SECS`        | `120`                           |
    /// | `VISION_MAX_TOKENS`          | `1024`                          |
    /// | `VISION_MAX_RESOLUTION`      | `1024`                          |
    /// | `VISION_RESIZE_QUALITY`      | `85`                            |
    /// | `VISION_RESIZE_FORMAT`       | `jpeg`                          |
    /// | `VISION_KEEP_ASPECT_RATIO`   | `true`                          |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend = std::env::var("VISION_BACKEND").unwrap_or(defaults.backend);
        let lmstudio_url =
            std::env::var("VISION_LMSTUDIO_URL").unwrap_or(defaults.lmstudio_url);
        let default_model =
            std::env::var("VISION_DEFAULT_MODEL").unwrap_or(defaults.default_model);

        let timeout_secs: u64 = std::env::var("VISION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("VISION_TIMEOUT_SECS must be a valid u64");

        let max_tokens: u32 = std::env::var("VISION_MAX_TOKENS")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("VISION_MAX_TOKENS must be a valid u32");

        let max_resolution: u32 = std::env::var("VISION_MAX_RESOLUTION")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("VISION_MAX_RESOLUTION must be a valid u32");

        let quality: u8 = std::env::var("VISION_RESIZE_QUALITY")
            .unwrap_or_else(|_| "85".into())
            .parse()
            .expect("VISION_RESIZE_QUALITY must be a valid u8");

        let format = OutputFormat::parse(
            &std::env::var("VISION_RESIZE_FORMAT").unwrap_or_else(|_| "jpeg".into()),
        );

        let maintain_aspect_ratio = std::env::var("VISION_KEEP_ASPECT_RATIO")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            backend,
            lmstudio_url,
            default_model,
            timeout_secs,
            max_tokens,
            preprocess: PreprocessConfig {
                max_resolution,
                quality,
                format,
                maintain_aspect_ratio,
            },
        }
    }
}
