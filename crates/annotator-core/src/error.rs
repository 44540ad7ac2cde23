use thiserror::Error;

use crate::annotation::AnnotationId;

/// The source buffer could not be opened as a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentLoadError {
    #[error("Failed to load PDF. The file might be corrupted or unsupported: {0}")]
    ParseError(String),

    #[error("PDF is encrypted and cannot be annotated")]
    Encrypted,

    #[error("PDF has no pages")]
    NoPages,
}

/// A page/scale combination could not be rasterized.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageRenderError {
    #[error("No document is loaded")]
    NoDocument,

    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("Invalid render scale: {0}")]
    InvalidScale(f64),

    #[error("Failed to render page: {0}")]
    Backend(String),
}

/// Compositing or serialization failed for the whole document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("No document is loaded")]
    NoDocument,

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Failed to write PDF: {0}")]
    SerializationError(String),
}

/// A single annotation could not be drawn; the compositor skips it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("Invalid signature image: {0}")]
    InvalidImage(String),

    #[error("Page {0} does not exist in the document")]
    MissingPage(u32),

    #[error("Page {0} has no rendered canvas size to convert from")]
    UnknownCanvas(u32),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}

/// An upload was rejected before reaching the render engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntakeError {
    #[error("File is empty")]
    Empty,

    #[error("PDF file size must be less than {limit} bytes (got {size})")]
    TooLarge { size: usize, limit: usize },

    #[error("Please drop a valid PDF file (got {0})")]
    UnsupportedType(String),

    #[error("Not a valid PDF file: {0}")]
    InvalidHeader(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Failed to encode signature image: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of `EditorSession::open`: the upload was rejected or the bytes did not load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Load(#[from] DocumentLoadError),
}

/// An annotation the compositor left out of the output, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAnnotation {
    pub id: AnnotationId,
    pub page: u32,
    pub reason: AnnotationError,
}
