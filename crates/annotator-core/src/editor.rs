//! Single-document editing session
//!
//! `EditorSession` ties the render engine, the annotation model and the
//! compositor together and keeps the view state the UI reads back: current
//! page, zoom, the canvas each page was last rendered at and the inline
//! error messages for the load, render and export controls.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationPatch, SignatureAnnotation, SignatureContent, TextAnnotation,
};
use crate::compositor::composite;
use crate::config::EditorConfig;
use crate::coords::{Size, Viewport};
use crate::error::{AnnotationError, DocumentLoadError, EditorError, ExportError, PageRenderError, SkippedAnnotation};
use crate::intake::{validate_upload, PDF_MIME_TYPE};
use crate::model::AnnotationModel;
use crate::render::{DocumentSummary, FinishedRender, PageRasterizer, RenderEngine, RenderJob, RenderOutcome};
use crate::signature::SignaturePad;

/// Last error shown next to each control; `None` once the action succeeds
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ErrorSlots {
    pub load: Option<String>,
    pub render: Option<String>,
    pub export: Option<String>,
}

/// Output of a successful export, ready to hand to the user as a download
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    /// Annotations left out because they could not be drawn
    pub skipped: Vec<SkippedAnnotation>,
}

pub struct EditorSession<R: PageRasterizer> {
    config: EditorConfig,
    engine: RenderEngine<R>,
    model: AnnotationModel,
    current_page: u32,
    scale: f64,
    rendered_canvases: BTreeMap<u32, Size>,
    errors: ErrorSlots,
    export: Option<ExportedDocument>,
}

impl<R: PageRasterizer> EditorSession<R> {
    pub fn new(rasterizer: R, config: EditorConfig) -> Self {
        let scale = config.view.initial_scale;
        Self {
            config,
            engine: RenderEngine::new(rasterizer),
            model: AnnotationModel::new(),
            current_page: 1,
            scale,
            rendered_canvases: BTreeMap::new(),
            errors: ErrorSlots::default(),
            export: None,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Check an upload and load it. A rejected upload leaves the current
    /// document in place; a load attempt always replaces it.
    pub fn open(&mut self, file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<DocumentSummary, EditorError> {
        if let Err(e) = validate_upload(file_name, mime_type, &bytes, self.config.upload.max_bytes) {
            self.errors.load = Some(e.to_string());
            return Err(e.into());
        }
        Ok(self.load(bytes)?)
    }

    /// Replace the document. Annotations, history, page, zoom and the last
    /// export are discarded first, even when parsing then fails.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<DocumentSummary, DocumentLoadError> {
        self.model.clear_all();
        self.current_page = 1;
        self.scale = self.config.view.initial_scale;
        self.rendered_canvases.clear();
        self.export = None;
        self.errors = ErrorSlots::default();

        match self.engine.load(bytes) {
            Ok(summary) => {
                info!(pages = summary.page_count, "Document opened for annotation");
                Ok(summary)
            }
            Err(e) => {
                self.errors.load = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_loaded()
    }

    pub fn page_count(&self) -> u32 {
        self.engine.page_count()
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Canvas of the latest applied render
    pub fn display_dimensions(&self) -> Option<Size> {
        self.engine.display_dimensions()
    }

    pub fn engine(&self) -> &RenderEngine<R> {
        &self.engine
    }

    /// Issue a render of the current page at the current scale.
    pub fn prepare_render(&mut self) -> Result<RenderJob<R>, PageRenderError> {
        self.engine
            .prepare(self.current_page, self.scale)
            .inspect_err(|e| self.errors.render = Some(e.to_string()))
    }

    /// Apply a finished render and remember the canvas it produced for its page.
    pub fn complete_render(&mut self, finished: FinishedRender<R::Surface>) -> Result<RenderOutcome, PageRenderError> {
        match self.engine.complete(finished) {
            Ok(RenderOutcome::Applied(viewport)) => {
                if let Some(rendered) = self.engine.current() {
                    self.rendered_canvases.insert(rendered.page, viewport.canvas);
                }
                self.errors.render = None;
                Ok(RenderOutcome::Applied(viewport))
            }
            Ok(RenderOutcome::Superseded) => Ok(RenderOutcome::Superseded),
            Err(e) => {
                self.errors.render = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn render_current(&mut self) -> Result<RenderOutcome, PageRenderError> {
        let job = self.prepare_render()?;
        let finished = job.run().await;
        self.complete_render(finished)
    }

    /// Returns true if the page changed. Out of range requests are ignored.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        if page < 1 || page > self.page_count() || page == self.current_page {
            return false;
        }
        debug!(from = self.current_page, to = page, "Changing page");
        self.current_page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.current_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> bool {
        self.go_to_page(self.current_page.saturating_sub(1))
    }

    pub fn zoom_in(&mut self) -> bool {
        self.zoom_by(self.config.view.zoom_step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.zoom_by(-self.config.view.zoom_step)
    }

    /// Step the scale, rounded to one decimal. Steps that would leave the
    /// configured range are ignored.
    fn zoom_by(&mut self, delta: f64) -> bool {
        let scale = ((self.scale + delta) * 10.0).round() / 10.0;
        let view = &self.config.view;
        if scale < view.min_scale || scale > view.max_scale || scale == self.scale {
            return false;
        }
        self.scale = scale;
        true
    }

    pub fn can_zoom_in(&self) -> bool {
        self.scale < self.config.view.max_scale
    }

    pub fn can_zoom_out(&self) -> bool {
        self.scale > self.config.view.min_scale
    }

    /// Canvas of the current page, if its latest render has been applied
    fn current_canvas(&self) -> Result<Size, AnnotationError> {
        self.engine
            .current()
            .filter(|rendered| rendered.page == self.current_page)
            .map(|rendered| rendered.viewport.canvas)
            .ok_or(AnnotationError::UnknownCanvas(self.current_page))
    }

    /// Place a placeholder text label at the center of the current page.
    pub fn add_text(&mut self) -> Result<AnnotationId, AnnotationError> {
        let center = self.current_canvas()?.center();
        let defaults = &self.config.annotations;
        let annotation = Annotation::Text(TextAnnotation {
            id: AnnotationId::nil(),
            text: defaults.placeholder_text.clone(),
            x: center.x,
            y: center.y,
            color: defaults.color,
            font_size: defaults.font_size,
            page: self.current_page,
            editing: true,
        });
        Ok(self.model.add(annotation))
    }

    /// Place an empty signature box at the center of the current page, in
    /// edit mode until `sign` fills it.
    pub fn add_signature(&mut self) -> Result<AnnotationId, AnnotationError> {
        let center = self.current_canvas()?.center();
        let defaults = &self.config.annotations;
        let annotation = Annotation::Signature(SignatureAnnotation {
            id: AnnotationId::nil(),
            x: center.x,
            y: center.y,
            width: defaults.pad_width as f64,
            height: defaults.pad_height as f64,
            color: defaults.color,
            line_width: defaults.line_width,
            page: self.current_page,
            editing: true,
            content: SignatureContent::default(),
        });
        Ok(self.model.add(annotation))
    }

    /// A capture surface sized and inked like new signature boxes
    pub fn signature_pad(&self) -> SignaturePad {
        let defaults = &self.config.annotations;
        SignaturePad::new(defaults.pad_width, defaults.pad_height).with_pen(defaults.color, defaults.line_width)
    }

    /// Store captured content on a signature and leave edit mode.
    pub fn sign(&mut self, id: AnnotationId, content: SignatureContent) -> bool {
        self.model.update(id, &AnnotationPatch::signed(content))
    }

    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) -> bool {
        self.model.update(id, patch)
    }

    pub fn delete(&mut self, id: AnnotationId) -> bool {
        self.model.delete(id)
    }

    pub fn undo(&mut self) -> bool {
        self.model.undo()
    }

    pub fn can_undo(&self) -> bool {
        self.model.can_undo()
    }

    pub fn clear_all(&mut self) {
        self.model.clear_all();
    }

    pub fn begin_drag(&mut self) {
        self.model.begin_gesture();
    }

    /// Move an annotation to a display position on its page.
    pub fn drag_to(&mut self, id: AnnotationId, x: f64, y: f64) -> bool {
        self.model.update(id, &AnnotationPatch::moved_to(x, y))
    }

    pub fn end_drag(&mut self) -> bool {
        self.model.end_gesture()
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.model.annotations()
    }

    pub fn annotations_on_current_page(&self) -> Vec<&Annotation> {
        self.model.on_page(self.current_page).collect()
    }

    pub fn model(&self) -> &AnnotationModel {
        &self.model
    }

    pub fn errors(&self) -> &ErrorSlots {
        &self.errors
    }

    pub fn last_export(&self) -> Option<&ExportedDocument> {
        self.export.as_ref()
    }

    /// Canvas a page's annotations were placed against: its last rendered
    /// canvas, or the page at the current scale if it was never rendered
    fn canvas_for(&self, page: u32) -> Option<Size> {
        self.rendered_canvases
            .get(&page)
            .copied()
            .or_else(|| self.engine.page_size(page).map(|size| Viewport::at_scale(size, self.scale).canvas))
    }

    /// Burn the annotations into a new copy of the document.
    ///
    /// The source bytes and the annotations are left untouched, so export can
    /// be repeated after further edits.
    pub fn export(&mut self) -> Result<&ExportedDocument, ExportError> {
        let result = self.composite_current();
        match result {
            Ok(exported) => {
                if !exported.skipped.is_empty() {
                    warn!(skipped = exported.skipped.len(), "Exported with skipped annotations");
                }
                self.errors.export = None;
                Ok(&*self.export.insert(exported))
            }
            Err(e) => {
                self.errors.export = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn composite_current(&self) -> Result<ExportedDocument, ExportError> {
        let source = self.engine.source().ok_or(ExportError::NoDocument)?;
        let options = self.config.export.composite_options();
        let report = composite(
            source,
            self.model.annotations(),
            |page| self.canvas_for(page),
            &options,
        )?;
        Ok(ExportedDocument {
            bytes: report.bytes,
            file_name: self.config.export.file_name.clone(),
            mime_type: PDF_MIME_TYPE.to_string(),
            skipped: report.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntakeError;
    use crate::fixtures::{create_sized_pdf, create_test_pdf};
    use crate::render::PaperRasterizer;
    use pretty_assertions::assert_eq;

    fn session() -> EditorSession<PaperRasterizer> {
        EditorSession::new(PaperRasterizer, EditorConfig::default())
    }

    #[tokio::test]
    async fn test_add_text_placed_at_canvas_center() {
        let mut editor = session();
        editor.load(create_sized_pdf(1, 600.0, 800.0)).unwrap();
        editor.render_current().await.unwrap();

        let id = editor.add_text().unwrap();
        let Some(Annotation::Text(text)) = editor.model().get(id) else {
            panic!("Expected text annotation");
        };
        // 600x800 at the initial 1.5 scale
        assert_eq!((text.x, text.y), (450.0, 600.0));
        assert_eq!(text.text, "Double-click to edit");
        assert!(text.editing);
        assert_eq!(text.page, 1);
    }

    #[test]
    fn test_add_refused_before_render() {
        let mut editor = session();
        editor.load(create_test_pdf(1)).unwrap();
        assert_eq!(editor.add_text(), Err(AnnotationError::UnknownCanvas(1)));
        assert!(editor.annotations().is_empty());
    }

    #[test]
    fn test_navigation_clamps() {
        let mut editor = session();
        editor.load(create_test_pdf(3)).unwrap();
        assert!(!editor.previous_page());
        assert!(editor.next_page());
        assert!(editor.next_page());
        assert!(!editor.next_page());
        assert_eq!(editor.current_page(), 3);
        assert!(!editor.go_to_page(0));
        assert!(!editor.go_to_page(4));
        assert!(editor.go_to_page(1));
        assert_eq!(editor.current_page(), 1);
    }

    #[test]
    fn test_zoom_steps_within_range() {
        let mut editor = session();
        assert_eq!(editor.scale(), 1.5);
        assert!(editor.zoom_in());
        assert_eq!(editor.scale(), 1.6);
        for _ in 0..30 {
            editor.zoom_out();
        }
        assert_eq!(editor.scale(), 0.5);
        assert!(!editor.zoom_out());
        assert!(!editor.can_zoom_out());
        for _ in 0..40 {
            editor.zoom_in();
        }
        assert_eq!(editor.scale(), 3.0);
        assert!(!editor.zoom_in());
    }

    #[tokio::test]
    async fn test_failed_load_resets_state() {
        let mut editor = session();
        editor.load(create_test_pdf(2)).unwrap();
        editor.next_page();
        editor.render_current().await.unwrap();
        editor.add_text().unwrap();
        editor.zoom_in();

        assert!(editor.load(b"%PDF-1.7 garbage".to_vec()).is_err());
        assert!(editor.annotations().is_empty());
        assert!(!editor.can_undo());
        assert_eq!(editor.current_page(), 1);
        assert_eq!(editor.scale(), 1.5);
        assert!(editor.errors().load.is_some());
        assert!(editor.last_export().is_none());
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_document() {
        let mut editor = session();
        editor.open("a.pdf", PDF_MIME_TYPE, create_test_pdf(1)).unwrap();
        editor.render_current().await.unwrap();
        editor.add_text().unwrap();

        let result = editor.open("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(
            result,
            Err(EditorError::Intake(IntakeError::UnsupportedType("text/plain".to_string())))
        );
        assert_eq!(editor.annotations().len(), 1);
        assert!(editor.errors().load.is_some());

        // A later successful load clears the inline error
        editor.open("b.pdf", PDF_MIME_TYPE, create_test_pdf(1)).unwrap();
        assert_eq!(editor.errors().load, None);
    }

    #[tokio::test]
    async fn test_render_error_recorded_and_cleared() {
        let mut editor = session();
        assert!(editor.render_current().await.is_err());
        assert!(editor.errors().render.is_some());

        editor.load(create_test_pdf(1)).unwrap();
        editor.render_current().await.unwrap();
        assert_eq!(editor.errors().render, None);
    }

    #[tokio::test]
    async fn test_oversized_page_reports_render_error() {
        let mut editor = session();
        editor.load(create_sized_pdf(2, 1e12, 1e12)).unwrap();
        assert!(matches!(editor.render_current().await, Err(PageRenderError::Backend(_))));
        assert!(editor.errors().render.is_some());
        assert_eq!(editor.add_text(), Err(AnnotationError::UnknownCanvas(1)));
    }

    #[tokio::test]
    async fn test_malformed_patch_color_is_refused() {
        let mut editor = session();
        editor.load(create_test_pdf(1)).unwrap();
        editor.render_current().await.unwrap();
        let id = editor.add_text().unwrap();

        for color in ["#aébcd", "+f+f+f", "#ééé", ""] {
            let json = format!(r#"{{"color":"{}"}}"#, color);
            assert!(serde_json::from_str::<AnnotationPatch>(&json).is_err(), "{}", color);
        }
        assert_eq!(editor.model().history_len(), 2);
        assert!(editor.update(id, &serde_json::from_str(r##"{"color":"#ff0000"}"##).unwrap()));
    }

    #[tokio::test]
    async fn test_drag_is_one_undo_step() {
        let mut editor = session();
        editor.load(create_test_pdf(1)).unwrap();
        editor.render_current().await.unwrap();
        let id = editor.add_text().unwrap();
        let start = editor.model().get(id).map(Annotation::position);

        editor.begin_drag();
        for step in 1..=10 {
            editor.drag_to(id, step as f64 * 5.0, 20.0);
        }
        assert!(editor.end_drag());

        assert!(editor.undo());
        assert_eq!(editor.model().get(id).map(Annotation::position), start);
    }

    #[test]
    fn test_export_without_document() {
        let mut editor = session();
        assert_eq!(editor.export().err(), Some(ExportError::NoDocument));
        assert!(editor.errors().export.is_some());
    }

    #[tokio::test]
    async fn test_export_uses_canvas_of_last_render() {
        let mut editor = session();
        editor.load(create_sized_pdf(1, 600.0, 800.0)).unwrap();
        editor.render_current().await.unwrap();
        editor.add_text().unwrap();

        // Zooming without re-rendering must not change the export mapping
        editor.zoom_in();
        let exported = editor.export().unwrap();
        assert_eq!(exported.file_name, "annotated.pdf");
        assert_eq!(exported.mime_type, "application/pdf");
        assert!(exported.skipped.is_empty());
        assert_eq!(editor.canvas_for(1), Some(Size::new(900.0, 1200.0)));
    }

    #[test]
    fn test_canvas_falls_back_to_current_scale() {
        let mut editor = session();
        editor.load(create_sized_pdf(2, 600.0, 800.0)).unwrap();
        assert_eq!(editor.canvas_for(2), Some(Size::new(900.0, 1200.0)));
        assert_eq!(editor.canvas_for(3), None);
    }

    #[tokio::test]
    async fn test_sign_fills_signature_and_leaves_edit_mode() {
        let mut editor = session();
        editor.load(create_test_pdf(1)).unwrap();
        editor.render_current().await.unwrap();
        let id = editor.add_signature().unwrap();

        let mut pad = editor.signature_pad();
        pad.pointer_down(crate::coords::Point::new(1.0, 1.0));
        pad.pointer_move(crate::coords::Point::new(20.0, 20.0));
        pad.pointer_up();
        let content = pad.save(crate::signature::CaptureFormat::Strokes).unwrap();
        assert!(editor.sign(id, content.clone()));

        let Some(Annotation::Signature(signature)) = editor.model().get(id) else {
            panic!("Expected signature annotation");
        };
        assert_eq!(signature.content, content);
        assert!(!signature.editing);
        assert_eq!((signature.width, signature.height), (400.0, 200.0));
    }
}
