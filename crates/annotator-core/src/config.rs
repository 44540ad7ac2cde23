//! Editor settings loaded from TOML
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```
//! use annotator_core::config::EditorConfig;
//!
//! let config = EditorConfig::from_toml_str(r#"
//!     [view]
//!     initial_scale = 1.0
//!
//!     [upload]
//!     max_bytes = 5_242_880
//! "#).unwrap();
//! assert_eq!(config.view.initial_scale, 1.0);
//! assert_eq!(config.view.max_scale, 3.0);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::annotation::Color;
use crate::compositor::CompositeOptions;
use crate::error::ConfigError;
use crate::intake::DEFAULT_MAX_UPLOAD_BYTES;
use crate::signature::{DEFAULT_LINE_WIDTH, DEFAULT_PAD_HEIGHT, DEFAULT_PAD_WIDTH};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EditorConfig {
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub annotations: AnnotationDefaults,
    #[serde(default)]
    pub export: ExportConfig,
}

impl EditorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let view = &self.view;
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
            }
        };
        positive("view.min_scale", view.min_scale)?;
        positive("view.zoom_step", view.zoom_step)?;
        positive("annotations.font_size", self.annotations.font_size)?;
        positive("annotations.line_width", self.annotations.line_width)?;
        positive("export.signature_image_scale", self.export.signature_image_scale)?;

        if view.min_scale > view.max_scale {
            return Err(ConfigError::Invalid(format!(
                "view.min_scale ({}) exceeds view.max_scale ({})",
                view.min_scale, view.max_scale
            )));
        }
        if view.initial_scale < view.min_scale || view.initial_scale > view.max_scale {
            return Err(ConfigError::Invalid(format!(
                "view.initial_scale ({}) is outside [{}, {}]",
                view.initial_scale, view.min_scale, view.max_scale
            )));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::Invalid("upload.max_bytes must be non-zero".to_string()));
        }
        if self.annotations.pad_width == 0 || self.annotations.pad_height == 0 {
            return Err(ConfigError::Invalid("signature pad must have a non-zero size".to_string()));
        }
        if self.export.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("export.file_name is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// Largest accepted upload (default: 10 MiB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

/// Zoom range and step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    #[serde(default = "default_initial_scale")]
    pub initial_scale: f64,
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            initial_scale: default_initial_scale(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            zoom_step: default_zoom_step(),
        }
    }
}

fn default_initial_scale() -> f64 {
    1.5
}

fn default_min_scale() -> f64 {
    0.5
}

fn default_max_scale() -> f64 {
    3.0
}

fn default_zoom_step() -> f64 {
    0.1
}

/// Values given to newly placed annotations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotationDefaults {
    #[serde(default = "default_placeholder")]
    pub placeholder_text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default)]
    pub color: Color,
    #[serde(default = "default_line_width")]
    pub line_width: f64,
    #[serde(default = "default_pad_width")]
    pub pad_width: u32,
    #[serde(default = "default_pad_height")]
    pub pad_height: u32,
}

impl Default for AnnotationDefaults {
    fn default() -> Self {
        Self {
            placeholder_text: default_placeholder(),
            font_size: default_font_size(),
            color: Color::BLACK,
            line_width: default_line_width(),
            pad_width: default_pad_width(),
            pad_height: default_pad_height(),
        }
    }
}

fn default_placeholder() -> String {
    "Double-click to edit".to_string()
}

fn default_font_size() -> f64 {
    16.0
}

fn default_line_width() -> f64 {
    DEFAULT_LINE_WIDTH
}

fn default_pad_width() -> u32 {
    DEFAULT_PAD_WIDTH
}

fn default_pad_height() -> u32 {
    DEFAULT_PAD_HEIGHT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_baseline_ratio")]
    pub text_baseline_ratio: f64,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default = "default_signature_image_scale")]
    pub signature_image_scale: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            text_baseline_ratio: default_baseline_ratio(),
            line_height: default_line_height(),
            signature_image_scale: default_signature_image_scale(),
        }
    }
}

impl ExportConfig {
    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            text_baseline_ratio: self.text_baseline_ratio,
            line_height: self.line_height,
            signature_image_scale: self.signature_image_scale,
        }
    }
}

fn default_file_name() -> String {
    "annotated.pdf".to_string()
}

fn default_baseline_ratio() -> f64 {
    0.8
}

fn default_line_height() -> f64 {
    1.2
}

fn default_signature_image_scale() -> f64 {
    0.5
}
