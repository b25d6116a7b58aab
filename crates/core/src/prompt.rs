//! Prompt assembly for caption generation.
//!
//! A prompt is the user-shapeable *creative* text followed by a fixed
//! output-format directive the user cannot override. Creative text is
//! resolved in order: named template, literal custom prompt, then a
//! built-in prompt selected by style.

use serde::{Deserialize, Serialize};

/// Built-in caption styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionStyle {
    /// One clear sentence suitable for training data.
    Natural,
    /// Two to three sentences with mood and composition notes.
    Detailed,
    /// Comma-separated lowercase tags.
    Tags,
    /// Caller supplies the creative prompt verbatim.
    Custom,
}

impl CaptionStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptionStyle::Natural => "natural",
            CaptionStyle::Detailed => "detailed",
            CaptionStyle::Tags => "tags",
            CaptionStyle::Custom => "custom",
        }
    }

    /// Parse a style name, falling back to `natural` for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "detailed" => CaptionStyle::Detailed,
            "tags" => CaptionStyle::Tags,
            "custom" => CaptionStyle::Custom,
            _ => CaptionStyle::Natural,
        }
    }
}

impl std::fmt::Display for CaptionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Curated prompt templates
// ---------------------------------------------------------------------------

/// Template id that refines a user-supplied caption rather than describing
/// the image from scratch. The user's text is appended to the template.
pub const TEMPLATE_REFINE: &str = "refine";

const TEMPLATE_DETAILED_P: &str = "Напиши ОДИН подробный абзац (6–10 предложений). Описывай только то, что видно: объект(ы) и действия; детали людей, если они есть (примерный возраст, гендерное выражение — если очевидно, волосы, мимика, поза, одежда, аксессуары); окружение (тип локации, элементы фона, признаки времени); освещение (источник, направление, мягкость/жёсткость, цветовая температура, тени); точку съёмки камеры (на уровне глаз / ниже / выше, дистанция) и композицию (кадрирование, акценты). Без вступлений, без рассуждений, без <think>.";

const TEMPLATE_ULTRA: &str = "Напиши ОДИН ультрадетальный абзац (10–16 предложений, ~180–320 слов). Опираться только на видимые детали. Включи: микродетали объекта (материалы, текстуры, узоры, износ, отражения); детали людей, если есть (волосы, тон кожи, макияж, украшения, типы тканей, посадка одежды); глубину окружения (передний/средний/задний план, вывески/предметы, материалы поверхностей); анализ освещения (ключевой/заполняющий/контровой свет, направление, мягкость, блики, форма теней); перспективу камеры (угол, “ощущение” объектива, глубина резкости) и композицию (ведущие линии, негативное пространство, симметрия/асимметрия, визуальная иерархия). Без вступлений, без рассуждений, без <think>.";

const TEMPLATE_CINEMATIC: &str = "Напиши ОДИН кинематографичный абзац (8–12 предложений). Опиши сцену как стоп-кадр из фильма: объект(ы) и действие; окружение и атмосферу; световую схему (практические источники света vs рассеянный, направление, контраст); язык камеры (тип плана, угол, ощущение объектива, глубина резкости, подразумеваемое движение); композицию и настроение. Ярко, но фактически (без выдуманного сюжета). Без вступлений, без рассуждений, без <think>.";

const TEMPLATE_TAGS: &str = "Act as an image-to-tag interrogation system. Your goal is to describe the image using a comprehensive list of tags in Danbooru style (booru-tags).\n\nSTRICT RULES:\nOutput ONLY tags separated by commas.\nNO introductory text, NO explanations, NO conversational filler.\nUse English only.\nUse underscores for multi-word tags (e.g., depth_of_field, long_hair).\nOrder: general tags, character/subject details, clothing/accessories, pose, background, lighting/effects, artistic style, technical parameters.\nBe extremely detailed: include specific colors, textures, camera angles, and atmosphere.\nTask: Analyze this image and provide the tag list.";

const TEMPLATE_REFINE_TEXT: &str = "You are refining an existing image caption. Rewrite the caption below so it is accurate, specific, and grammatical while keeping its original intent and level of detail. Output ONLY the improved caption, no commentary.";

/// All curated template ids and their creative text.
pub const PROMPT_TEMPLATES: &[(&str, &str)] = &[
    ("detailed_p", TEMPLATE_DETAILED_P),
    ("ultra", TEMPLATE_ULTRA),
    ("cinematic", TEMPLATE_CINEMATIC),
    ("tags", TEMPLATE_TAGS),
    (TEMPLATE_REFINE, TEMPLATE_REFINE_TEXT),
];

/// Look up a curated template's creative text by id.
pub fn template_text(id: &str) -> Option<&'static str> {
    PROMPT_TEMPLATES
        .iter()
        .find(|(k, _)| *k == id)
        .map(|(_, v)| *v)
}

// ---------------------------------------------------------------------------
// Built-in style prompts
// ---------------------------------------------------------------------------

const STYLE_NATURAL: &str = "Describe this image in one clear, concise sentence suitable for AI image generation training.\nFocus on: main subject, action/pose, setting/background.\nBe objective and descriptive. Avoid subjective interpretations.";

const STYLE_DETAILED: &str = "Provide a detailed 2-3 sentence description of this image suitable for AI training.\nInclude: subjects, actions, environment, mood, lighting, notable details, composition.\nBe specific and objective.";

const STYLE_TAGS: &str = "Generate 15-25 comma-separated lowercase tags describing this image. NOT a sentence - just tags separated by commas.\nInclude: subject, gender, pose/action, clothing details, hair color/style, eye color, background/setting, lighting, colors, mood.";

/// Output-format directive appended to every prompt. Not user-overridable:
/// downstream parsing depends on this schema.
pub const OUTPUT_DIRECTIVE: &str = "\n\nAlso assess the image quality for training suitability.\n\nOutput format (JSON only, no other text):\n{\n  \"caption\": \"Your English caption here\",\n  \"caption_ru\": \"Russian translation of the caption\",\n  \"quality\": {\n    \"sharpness\": 0.0-1.0,\n    \"clarity\": 0.0-1.0,\n    \"composition\": 0.0-1.0,\n    \"exposure\": 0.0-1.0,\n    \"overall\": 0.0-1.0\n  },\n  \"flags\": [\"list\", \"of\", \"any\", \"quality\", \"issues\"]\n}";

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

/// Inputs for one prompt build.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSpec<'a> {
    pub style: Option<CaptionStyle>,
    pub max_length: Option<u32>,
    pub custom_prompt: Option<&'a str>,
    pub trigger_phrase: Option<&'a str>,
    pub template_id: Option<&'a str>,
}

/// Build the complete prompt: creative text plus the output directive.
pub fn build_prompt(spec: &PromptSpec<'_>) -> String {
    let mut prompt = creative_prompt(spec);
    prompt.push_str(OUTPUT_DIRECTIVE);
    prompt
}

/// Resolve the creative (user-shapeable) part of the prompt.
///
/// Resolution order: known template id, then literal custom prompt, then a
/// built-in prompt by style. The `refine` template appends the supplied
/// custom text as the caption to refine.
pub fn creative_prompt(spec: &PromptSpec<'_>) -> String {
    let mut creative = resolve_creative_base(spec);

    if let Some(phrase) = spec.trigger_phrase.filter(|p| !p.is_empty()) {
        creative.push_str(&trigger_instruction(spec, phrase));
    }

    // Textual hint only; length is not enforced programmatically.
    if let Some(max_length) = spec.max_length {
        creative.push_str(&format!("\n\nMaximum length: {max_length} characters."));
    }

    creative
}

fn resolve_creative_base(spec: &PromptSpec<'_>) -> String {
    if let Some(template) = spec.template_id.and_then(template_text) {
        let template_id = spec.template_id.unwrap_or_default();
        tracing::debug!(template_id, "Using prompt template");

        if template_id == TEMPLATE_REFINE {
            return match spec.custom_prompt.filter(|p| !p.is_empty()) {
                Some(text) => format!("{template}\n\nUser prompt to refine:\n{text}"),
                None => {
                    tracing::warn!(
                        "Template 'refine' selected but no custom prompt (text to refine) provided"
                    );
                    template.to_string()
                }
            };
        }
        return template.to_string();
    }

    if let Some(custom) = spec.custom_prompt.filter(|p| !p.is_empty()) {
        tracing::debug!(chars = custom.len(), "Using custom prompt");
        return custom.to_string();
    }

    let mut style = spec.style.unwrap_or(CaptionStyle::Natural);
    if style == CaptionStyle::Custom {
        tracing::warn!("Style is 'custom' but no custom prompt provided, falling back to natural");
        style = CaptionStyle::Natural;
    }

    match style {
        CaptionStyle::Detailed => STYLE_DETAILED.to_string(),
        CaptionStyle::Tags => STYLE_TAGS.to_string(),
        CaptionStyle::Natural | CaptionStyle::Custom => STYLE_NATURAL.to_string(),
    }
}

/// The trigger-phrase instruction differs by output shape: tag output wants
/// the phrase as the first tag, sentence output wants it to open the
/// sentence.
fn trigger_instruction(spec: &PromptSpec<'_>, phrase: &str) -> String {
    let tag_shaped = spec.style == Some(CaptionStyle::Tags)
        || spec
            .custom_prompt
            .is_some_and(|p| p.to_lowercase().contains("tag"));

    if tag_shaped {
        format!(
            "\n\nIMPORTANT: The caption MUST start with \"{phrase}\" as the first tag.\nExample: \"{phrase}, woman, brown hair, white dress, studio, soft lighting\""
        )
    } else {
        format!(
            "\n\nIMPORTANT: The caption MUST begin with \"{phrase}\" followed by a description of the image."
        )
    }
}
