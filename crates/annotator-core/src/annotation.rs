//! Annotation types placed over rendered pages
//!
//! Positions are display-canvas pixels at the scale that was active when the
//! annotation was placed or last dragged. They are converted to page space
//! only when the document is exported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coords::Point;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Placeholder carried by annotations before the model assigns an id
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// RGB color, written as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`, `RRGGBB` or `#RGB`
    pub fn from_hex(color: &str) -> Option<Self> {
        let hex = color.trim().trim_start_matches('#');
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            6 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => {
                let mut digits = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                Some(Self {
                    r: digits.next()??,
                    g: digits.next()??,
                    b: digits.next()??,
                })
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Components in the 0-1 range used by PDF color operators
    pub fn normalized(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid color: {s}")))
    }
}

/// One pointer-down to pointer-up gesture on the signature surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Stroke {
    pub points: Vec<Point>,
}

/// A rasterized signature, kept as PNG bytes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureImage {
    #[serde(with = "data_url")]
    pub png: Vec<u8>,
}

impl SignatureImage {
    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    /// Accepts `data:image/png;base64,...` or bare base64
    pub fn from_data_url(url: &str) -> Result<Self, base64::DecodeError> {
        data_url::decode(url).map(Self::from_png)
    }

    pub fn to_data_url(&self) -> String {
        data_url::encode(&self.png)
    }
}

mod data_url {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    const PREFIX: &str = "data:image/png;base64,";

    pub fn encode(bytes: &[u8]) -> String {
        format!("{}{}", PREFIX, STANDARD.encode(bytes))
    }

    pub fn decode(url: &str) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = match url.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => url,
        };
        STANDARD.decode(payload.trim())
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data")]
pub enum SignatureContent {
    Strokes(Vec<Stroke>),
    Image(SignatureImage),
}

impl SignatureContent {
    /// True for a signature with nothing drawn yet
    pub fn is_blank(&self) -> bool {
        match self {
            SignatureContent::Strokes(strokes) => strokes.iter().all(|s| s.points.is_empty()),
            SignatureContent::Image(image) => image.png.is_empty(),
        }
    }
}

impl Default for SignatureContent {
    fn default() -> Self {
        SignatureContent::Strokes(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub color: Color,
    pub font_size: f64,
    pub page: u32,
    pub editing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureAnnotation {
    pub id: AnnotationId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Color,
    pub line_width: f64,
    pub page: u32,
    pub editing: bool,
    pub content: SignatureContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Annotation {
    Text(TextAnnotation),
    Signature(SignatureAnnotation),
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        match self {
            Annotation::Text(t) => t.id,
            Annotation::Signature(s) => s.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: AnnotationId) {
        match self {
            Annotation::Text(t) => t.id = id,
            Annotation::Signature(s) => s.id = id,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Annotation::Text(t) => t.page,
            Annotation::Signature(s) => s.page,
        }
    }

    pub fn position(&self) -> Point {
        match self {
            Annotation::Text(t) => Point::new(t.x, t.y),
            Annotation::Signature(s) => Point::new(s.x, s.y),
        }
    }

    pub fn is_editing(&self) -> bool {
        match self {
            Annotation::Text(t) => t.editing,
            Annotation::Signature(s) => s.editing,
        }
    }

    /// Merge the patch's fields into this annotation. Fields that do not
    /// belong to this variant are ignored.
    pub fn apply(&mut self, patch: &AnnotationPatch) {
        match self {
            Annotation::Text(t) => {
                if let Some(text) = &patch.text {
                    t.text = text.clone();
                }
                if let Some(x) = patch.x {
                    t.x = x;
                }
                if let Some(y) = patch.y {
                    t.y = y;
                }
                if let Some(color) = patch.color {
                    t.color = color;
                }
                if let Some(font_size) = patch.font_size {
                    t.font_size = font_size;
                }
                if let Some(editing) = patch.editing {
                    t.editing = editing;
                }
            }
            Annotation::Signature(s) => {
                if let Some(x) = patch.x {
                    s.x = x;
                }
                if let Some(y) = patch.y {
                    s.y = y;
                }
                if let Some(width) = patch.width {
                    s.width = width;
                }
                if let Some(height) = patch.height {
                    s.height = height;
                }
                if let Some(color) = patch.color {
                    s.color = color;
                }
                if let Some(line_width) = patch.line_width {
                    s.line_width = line_width;
                }
                if let Some(editing) = patch.editing {
                    s.editing = editing;
                }
                if let Some(content) = &patch.content {
                    s.content = content.clone();
                }
            }
        }
    }
}

/// Partial update for `AnnotationModel::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub color: Option<Color>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub editing: Option<bool>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub line_width: Option<f64>,
    #[serde(default)]
    pub content: Option<SignatureContent>,
}

impl AnnotationPatch {
    pub fn moved_to(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn editing(editing: bool) -> Self {
        Self {
            editing: Some(editing),
            ..Self::default()
        }
    }

    /// Finishing a signature drawing also leaves edit mode
    pub fn signed(content: SignatureContent) -> Self {
        Self {
            content: Some(content),
            editing: Some(false),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = Some(font_size);
        self
    }
}
