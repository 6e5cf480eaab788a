//! Core types for room editing requests and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Visual theme for whole-room generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleTag {
    Scandinavian,
    Industrial,
    Japandi,
    Cyberpunk,
    LuxuryModern,
}

impl StyleTag {
    /// Parse a style tag from either its short id or its full name
    ///
    /// Unknown tags yield `None`; callers treat that as "no style".
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "scandi" | "scandinavian" | "scandinave" => Some(Self::Scandinavian),
            "indus" | "industrial" | "industriel" => Some(Self::Industrial),
            "japandi" => Some(Self::Japandi),
            "cyber" | "cyberpunk" => Some(Self::Cyberpunk),
            "lux" | "luxury" | "luxury-modern" | "luxury_modern" | "luxe-moderne" => {
                Some(Self::LuxuryModern)
            },
            _ => None,
        }
    }

    /// Short id used by the frontend
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Scandinavian => "scandi",
            Self::Industrial => "indus",
            Self::Japandi => "japandi",
            Self::Cyberpunk => "cyber",
            Self::LuxuryModern => "lux",
        }
    }
}

/// Catalog category of the product being staged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Couch,
    Chair,
    Plant,
    Table,
    Tv,
    Other,
}

impl ProductCategory {
    /// Parse a catalog category, mapping anything unrecognized to `Other`
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "couch" | "sofa" | "canape" | "canapé" => Self::Couch,
            "chair" | "armchair" | "chaise" | "fauteuil" => Self::Chair,
            "plant" | "plante" => Self::Plant,
            "table" => Self::Table,
            "tv" | "television" => Self::Tv,
            _ => Self::Other,
        }
    }
}

/// Coarse dominant color of a reference product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLabel {
    Black,
    White,
    Grey,
    Red,
    Orange,
    Green,
    Blue,
    Purple,
    Yellow,
    Brown,
    Unknown,
}

impl ColorLabel {
    /// Prompt token for this color; `Unknown` is the empty string
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
            Self::Grey => "grey",
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Purple => "purple",
            Self::Yellow => "yellow",
            Self::Brown => "brown",
            Self::Unknown => "",
        }
    }

    /// Whether this label belongs to the achromatic family
    #[must_use]
    pub fn is_grey_family(self) -> bool {
        matches!(self, Self::Black | Self::White | Self::Grey)
    }
}

impl std::fmt::Display for ColorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes inferred from a reference image for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAttributes {
    pub dominant_color: ColorLabel,
    /// Free-form shape descriptor, empty when nothing applies
    pub shape_hint: String,
}

impl Default for ReferenceAttributes {
    fn default() -> Self {
        Self {
            dominant_color: ColorLabel::Unknown,
            shape_hint: String::new(),
        }
    }
}

/// Prompt pair plus guidance for exactly one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedPrompt {
    pub positive: String,
    pub negative: String,
    pub guidance_scale: f32,
}

/// Where the reference image of an edit comes from
#[derive(Debug, Clone, Default)]
pub enum ReferenceSource {
    #[default]
    None,
    /// Uploaded image bytes
    Upload(Vec<u8>),
    /// Remote or service-local URI
    Uri(String),
    /// Upload first, URI as fallback
    UploadOrUri { upload: Vec<u8>, uri: String },
}

impl ReferenceSource {
    /// Build a source from optional upload bytes and an optional URI
    #[must_use]
    pub fn from_parts(upload: Option<Vec<u8>>, uri: Option<String>) -> Self {
        let uri = uri.filter(|u| !u.trim().is_empty());
        match (upload, uri) {
            (Some(upload), Some(uri)) => Self::UploadOrUri { upload, uri },
            (Some(upload), None) => Self::Upload(upload),
            (None, Some(uri)) => Self::Uri(uri),
            (None, None) => Self::None,
        }
    }
}

/// A masked edit of a room photograph
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub base_image: Vec<u8>,
    pub mask: Vec<u8>,
    pub reference: ReferenceSource,
    pub user_prompt: String,
    pub category: Option<ProductCategory>,
    pub style: Option<StyleTag>,
}

impl EditRequest {
    /// Create a request without reference, category or style
    pub fn new<S: Into<String>>(base_image: Vec<u8>, mask: Vec<u8>, user_prompt: S) -> Self {
        Self {
            base_image,
            mask,
            reference: ReferenceSource::None,
            user_prompt: user_prompt.into(),
            category: None,
            style: None,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference: ReferenceSource) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: ProductCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: StyleTag) -> Self {
        self.style = Some(style);
        self
    }
}

/// A whole-room restyling of a photograph
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub image: Vec<u8>,
    pub user_prompt: String,
    pub style: Option<StyleTag>,
}

/// Which of the two edit behaviors a request resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Clear the masked region to an empty surface
    Remove,
    /// Fill the masked region with the reference product
    Stage,
}

impl EditMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Stage => "stage",
        }
    }
}

/// Where a resolved reference image came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "location")]
pub enum ReferenceOrigin {
    Upload,
    LocalStorage(PathBuf),
    Remote(String),
}

/// Kind of artifact, which decides the filename prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Whole-room generation from an edge map
    Generation,
    /// Masked removal or staging edit
    Edit,
}

impl ArtifactKind {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Generation => "gen",
            Self::Edit => "inpaint",
        }
    }
}

/// A persisted generation result
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArtifact {
    /// PNG-encoded image
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    pub filename: String,
    pub stored_path: PathBuf,
    pub public_url: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

/// One entry of a gallery listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryEntry {
    pub filename: String,
    pub public_url: String,
    pub modified: DateTime<Utc>,
}

/// Box in coordinates normalized to the image size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl NormalizedBox {
    /// Clamp all coordinates to [0, 1] and order min/max
    #[must_use]
    pub fn clamped(self) -> Self {
        let (x0, x1) = (self.x_min.clamp(0.0, 1.0), self.x_max.clamp(0.0, 1.0));
        let (y0, y1) = (self.y_min.clamp(0.0, 1.0), self.y_max.clamp(0.0, 1.0));
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }
}

/// Object found by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    pub bbox: NormalizedBox,
}

/// Per-stage timings in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub reference_ms: u64,
    pub analysis_ms: u64,
    pub generation_ms: u64,
    pub persist_ms: u64,
    pub total_ms: u64,
}

/// Result of a masked edit
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub mode: EditMode,
    pub prompt: SynthesizedPrompt,
    /// Present only in stage mode
    pub attributes: Option<ReferenceAttributes>,
    pub reference_origin: Option<ReferenceOrigin>,
    pub artifact: GeneratedArtifact,
    pub timings: ProcessingTimings,
}

/// Result of a whole-room generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub prompt: SynthesizedPrompt,
    pub artifact: GeneratedArtifact,
    pub timings: ProcessingTimings,
}
