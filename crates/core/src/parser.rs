//! Parsing of loosely-structured vision model replies.
//!
//! Models are instructed to return a JSON object but routinely wrap it in a
//! markdown code fence or ignore the directive entirely. The parser accepts
//! all three shapes and never fails: unstructured text degrades to a bare
//! caption with boilerplate prefixes stripped.

use serde_json::Value;

/// Typed result of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCaption {
    pub caption: String,
    pub caption_ru: Option<String>,
    /// The model's self-reported `quality.overall` score in [0,1].
    pub quality_score: Option<f64>,
    pub quality_flags: Option<Vec<String>>,
}

/// Boilerplate prefixes models prepend despite instructions. Stripped
/// case-insensitively from unstructured replies, in catalog order, so a
/// reply like "Here is a description: ..." loses both layers.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "Caption:",
    "Description:",
    "Here is",
    "Here's",
    "The image shows",
    "This image shows",
    "In this image,",
    "a description:",
    "a caption:",
];

/// Parse a raw model reply into a [`ParsedCaption`].
///
/// Shapes handled: pure JSON, JSON inside a code fence (language tag
/// optional), and unstructured free text.
pub fn parse_response(raw: &str) -> ParsedCaption {
    let trimmed = raw.trim();
    let candidate = extract_fenced_json(trimmed).unwrap_or(trimmed);

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(candidate) {
        if let Some(caption) = obj.get("caption").and_then(Value::as_str) {
            let caption_ru = obj
                .get("caption_ru")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let quality = obj.get("quality").and_then(Value::as_object);
            let quality_score = quality
                .and_then(|q| q.get("overall"))
                .and_then(Value::as_f64);

            let flags: Vec<String> = obj
                .get("flags")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            // Empty flags with a populated quality object: surface the
            // per-axis scores as "key:value" flags instead.
            let quality_flags = if !flags.is_empty() {
                Some(flags)
            } else {
                quality.map(synthesize_quality_flags).filter(|f| !f.is_empty())
            };

            return ParsedCaption {
                caption: caption.to_string(),
                caption_ru,
                quality_score,
                quality_flags,
            };
        }
        tracing::debug!("Model JSON has no 'caption' key, treating reply as free text");
    }

    free_text_caption(trimmed)
}

/// Extract the inner text of the first markdown code fence, if any.
/// The language tag after the opening fence is optional.
fn extract_fenced_json(text: &str) -> Option<&str> {
    let start = if let Some(idx) = text.find("```json") {
        idx + "```json".len()
    } else {
        text.find("```")? + "```".len()
    };
    let end = text[start..].find("```")? + start;
    Some(text[start..end].trim())
}

/// Render non-`overall` quality entries as `"key:value"` strings.
fn synthesize_quality_flags(quality: &serde_json::Map<String, Value>) -> Vec<String> {
    quality
        .iter()
        .filter(|(key, _)| key.as_str() != "overall")
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}:{s}"),
            other => format!("{key}:{other}"),
        })
        .collect()
}

/// Fallback path: the whole reply is the caption. Strip known boilerplate
/// prefixes, then one layer of wrapping quotes.
fn free_text_caption(text: &str) -> ParsedCaption {
    let mut caption = text.to_string();

    for prefix in BOILERPLATE_PREFIXES {
        let lowered = caption.to_lowercase();
        if lowered.starts_with(&prefix.to_lowercase()) {
            caption = caption[prefix.len()..].trim_start().to_string();
        }
    }

    if caption.len() >= 2 && caption.starts_with('"') && caption.ends_with('"') {
        caption = caption[1..caption.len() - 1].to_string();
    }

    ParsedCaption {
        caption,
        caption_ru: None,
        quality_score: None,
        quality_flags: None,
    }
}
