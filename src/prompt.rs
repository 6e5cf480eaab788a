//! Prompt synthesis for generation, removal and staging
//!
//! Synthesis is deterministic: identical inputs always give byte-identical
//! prompts. Any randomness belongs to the generation backend.

use crate::{
    config::PipelineConfig,
    types::{ReferenceAttributes, StyleTag, SynthesizedPrompt},
};
use tracing::warn;

/// Longest positive prompt accepted before falling back to the minimal form
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Suffix appended to every whole-room generation prompt
const GENERATION_QUALITY_SUFFIX: &str = "interior design, photorealistic, 8k, high quality";

/// Exclusions for whole-room generation
const GENERATION_NEGATIVE: &str =
    "low quality, blurry, distorted, ugly, bad anatomy, watermark, text";

const REMOVAL_POSITIVE: &str =
    "empty room, clean empty surface, bare floor, plain wall, seamless continuation of the surroundings, photorealistic, high quality";

const REMOVAL_NEGATIVE: &str =
    "furniture, object, sofa, chair, table, lamp, plant, decoration, clutter, person, artifacts, smudge, blurry, distorted, low quality";

/// Base exclusions for staging
const STAGING_NEGATIVE: &str =
    "low quality, blurry, distorted, deformed, bad proportions, cartoon, drawing, watermark, text, floating object, duplicate";

/// Extra exclusions when the product is black
const LIGHT_TONE_EXCLUSIONS: &str = "white, beige, grey, light colors, bright colors, pale";

/// Extra exclusions when the product is white
const DARK_TONE_EXCLUSIONS: &str = "black, dark colors, grey, shadowy";

/// Canned descriptor for a style tag; no tag means no descriptor
#[must_use]
pub fn style_descriptor(style: Option<StyleTag>) -> &'static str {
    match style {
        Some(StyleTag::Scandinavian) => {
            "scandinavian style, minimalist, bright, wooden furniture, white walls, cozy"
        },
        Some(StyleTag::Industrial) => {
            "industrial style, loft, brick walls, metal furniture, dark tones, raw materials"
        },
        Some(StyleTag::Japandi) => {
            "japandi style, zen, organic shapes, neutral colors, natural light, plants"
        },
        Some(StyleTag::Cyberpunk) => {
            "cyberpunk style, neon lights, futuristic furniture, dark atmosphere, high tech"
        },
        Some(StyleTag::LuxuryModern) => {
            "luxury modern style, marble, gold accents, velvet, expensive, sophisticated"
        },
        None => "",
    }
}

/// Remove control characters and collapse runs of whitespace
#[must_use]
pub fn normalize_user_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join non-empty segments with ", "
fn join_segments<'a, I: IntoIterator<Item = &'a str>>(segments: I) -> String {
    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a staging prompt could not be built in full
#[derive(Debug, Clone, PartialEq, Eq)]
enum StagingPromptError {
    EmptySubject,
    TooLong(usize),
}

/// Builds prompt pairs with the configured guidance scales
#[derive(Debug, Clone)]
pub struct PromptSynthesizer {
    generation_guidance: f32,
    removal_guidance: f32,
    staging_guidance: f32,
}

impl Default for PromptSynthesizer {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PromptSynthesizer {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            generation_guidance: config.generation_guidance,
            removal_guidance: config.removal_guidance,
            staging_guidance: config.staging_guidance,
        }
    }
}

impl PromptSynthesizer {
    /// Prompt for whole-room generation from an edge map
    #[must_use]
    pub fn build_generation_prompt(
        &self,
        user_prompt: &str,
        style: Option<StyleTag>,
    ) -> SynthesizedPrompt {
        let user_prompt = normalize_user_text(user_prompt);
        SynthesizedPrompt {
            positive: join_segments([
                user_prompt.as_str(),
                style_descriptor(style),
                GENERATION_QUALITY_SUFFIX,
            ]),
            negative: GENERATION_NEGATIVE.to_string(),
            guidance_scale: self.generation_guidance,
        }
    }

    /// Prompt that clears the masked region
    #[must_use]
    pub fn build_removal_prompt(&self) -> SynthesizedPrompt {
        SynthesizedPrompt {
            positive: REMOVAL_POSITIVE.to_string(),
            negative: REMOVAL_NEGATIVE.to_string(),
            guidance_scale: self.removal_guidance,
        }
    }

    /// Prompt that fills the masked region with the reference product
    ///
    /// Never fails: if the full prompt cannot be built, the minimal safe form
    /// is returned instead.
    #[must_use]
    pub fn build_staging_prompt(
        &self,
        user_prompt: &str,
        attrs: &ReferenceAttributes,
    ) -> SynthesizedPrompt {
        let subject = normalize_user_text(user_prompt);
        match self.try_build_staging_prompt(&subject, attrs) {
            Ok(prompt) => prompt,
            Err(reason) => {
                warn!(?reason, "Falling back to minimal staging prompt");
                self.minimal_staging_prompt(&subject)
            },
        }
    }

    /// Append a style descriptor to an edit prompt
    ///
    /// The negative prompt is left as built, so lightness exclusions only
    /// follow the subject and its inferred color, never the style wording.
    #[must_use]
    pub fn apply_style(
        &self,
        prompt: SynthesizedPrompt,
        style: Option<StyleTag>,
    ) -> SynthesizedPrompt {
        let descriptor = style_descriptor(style);
        if descriptor.is_empty() {
            return prompt;
        }
        SynthesizedPrompt {
            positive: join_segments([prompt.positive.as_str(), descriptor]),
            ..prompt
        }
    }

    fn try_build_staging_prompt(
        &self,
        subject: &str,
        attrs: &ReferenceAttributes,
    ) -> Result<SynthesizedPrompt, StagingPromptError> {
        if subject.is_empty() {
            return Err(StagingPromptError::EmptySubject);
        }

        let color = attrs.dominant_color.as_str();
        let lead = if color.is_empty() {
            format!("photo of {}", subject)
        } else {
            format!("photo of {} {}", color, subject)
        };
        let texture = if color.is_empty() {
            String::new()
        } else {
            format!("{} texture", color)
        };

        let positive = join_segments([
            lead.as_str(),
            attrs.shape_hint.as_str(),
            "high quality",
            "realistic",
            "interior design",
            texture.as_str(),
            "product view",
        ]);

        let length = positive.chars().count();
        if length > MAX_PROMPT_CHARS {
            return Err(StagingPromptError::TooLong(length));
        }

        Ok(SynthesizedPrompt {
            negative: staging_negative(&positive),
            positive,
            guidance_scale: self.staging_guidance,
        })
    }

    fn minimal_staging_prompt(&self, subject: &str) -> SynthesizedPrompt {
        let budget = MAX_PROMPT_CHARS.saturating_sub(60);
        let subject: String = subject.chars().take(budget).collect();
        let lead = match subject.trim() {
            "" => "high quality photo".to_string(),
            subject => format!("high quality photo of {}", subject),
        };
        SynthesizedPrompt {
            positive: join_segments([lead.as_str(), "product view", "photorealistic"]),
            negative: STAGING_NEGATIVE.to_string(),
            guidance_scale: self.staging_guidance,
        }
    }
}

/// Staging negative prompt, extended with opposite-lightness exclusions
///
/// The check is a case-insensitive substring match on the final positive
/// text, so "black" or "white" in the user's own words also triggers it.
#[must_use]
pub fn staging_negative(positive: &str) -> String {
    let lowered = positive.to_lowercase();
    let mut segments = vec![STAGING_NEGATIVE];
    if lowered.contains("black") {
        segments.push(LIGHT_TONE_EXCLUSIONS);
    }
    if lowered.contains("white") {
        segments.push(DARK_TONE_EXCLUSIONS);
    }
    segments.join(", ")
}
