//! PDF annotation core
//!
//! Places text labels and freehand signatures over rendered pages and burns
//! them into a new copy of the document with lopdf.
//!
//! - `render`: loads a document and drives page rendering through a `PageRasterizer`
//! - `model`: the annotation collection with linear undo
//! - `signature`: freehand capture surface
//! - `compositor`: flattens annotations into page content on export
//! - `editor`: one editing session wiring the above together

pub mod annotation;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod editor;
pub mod error;
pub mod history;
pub mod intake;
pub mod model;
pub mod page_info;
pub mod render;
pub mod signature;

#[cfg(test)]
pub(crate) mod fixtures;

pub use annotation::{
    Annotation, AnnotationId, AnnotationPatch, Color, SignatureAnnotation, SignatureContent, SignatureImage,
    Stroke, TextAnnotation,
};
pub use compositor::{composite, CompositeOptions, CompositeReport};
pub use config::EditorConfig;
pub use coords::{PageTransform, Point, Size, Viewport};
pub use editor::{EditorSession, ErrorSlots, ExportedDocument};
pub use error::{
    AnnotationError, ConfigError, DocumentLoadError, EditorError, ExportError, IntakeError, PageRenderError,
    SignatureError, SkippedAnnotation,
};
pub use history::History;
pub use model::AnnotationModel;
pub use page_info::PageGeometry;
pub use render::{
    DocumentSummary, FinishedRender, PageRasterizer, PaperRasterizer, RasterRequest, RenderEngine, RenderJob,
    RenderOutcome, RenderedPage,
};
pub use signature::{CaptureFormat, SignaturePad};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, DocumentLoadError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| DocumentLoadError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
