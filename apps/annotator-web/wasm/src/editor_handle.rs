//! WASM-exposed editing session
//!
//! Wraps `annotator_core::EditorSession` for the browser. The session sits
//! behind `Rc<RefCell<..>>` so a page render can await PDF.js without holding
//! a borrow: the ticket is issued, the borrow released, the callback awaited,
//! and the result applied under a fresh borrow.

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use annotator_core::{
    AnnotationId, AnnotationPatch, CaptureFormat, EditorConfig, EditorError, EditorSession, Point, RenderOutcome,
    SignaturePad,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::download::ObjectUrl;
use crate::pdfjs::PdfJsRasterizer;

type Session = EditorSession<PdfJsRasterizer>;

/// Session for annotating a single PDF document
#[wasm_bindgen]
pub struct AnnotatorEditor {
    session: Rc<RefCell<Session>>,
    pad: SignaturePad,
    download: Option<ObjectUrl>,
}

#[wasm_bindgen]
impl AnnotatorEditor {
    /// Create an editor that draws pages through `draw`.
    /// `config_toml` overrides the default editor settings.
    #[wasm_bindgen(constructor)]
    pub fn new(draw: js_sys::Function, config_toml: Option<String>) -> Result<AnnotatorEditor, JsValue> {
        let config = match config_toml {
            Some(toml) => EditorConfig::from_toml_str(&toml).map_err(to_js)?,
            None => EditorConfig::default(),
        };
        let session = EditorSession::new(PdfJsRasterizer::new(draw), config);
        let pad = session.signature_pad();

        Ok(AnnotatorEditor {
            session: Rc::new(RefCell::new(session)),
            pad,
            download: None,
        })
    }

    /// Validate and load a picked file. A file rejected at intake leaves
    /// everything in place; once loading starts, the previous document, its
    /// annotations and its download are discarded even if parsing fails.
    /// Returns `{ page_count, pages }`.
    pub fn open(&mut self, name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<JsValue, JsValue> {
        let result = self.session.borrow_mut().open(name, mime_type, bytes);
        if !matches!(result, Err(EditorError::Intake(_))) {
            self.download = None;
        }
        let summary = result.map_err(to_js)?;

        serde_wasm_bindgen::to_value(&summary)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Render the current page at the current scale.
    /// Resolves to "applied", or "superseded" when a newer render was
    /// requested in the meantime.
    pub fn render(&self) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        future_to_promise(async move {
            let job = session.borrow_mut().prepare_render().map_err(to_js)?;
            let finished = job.run().await;
            let outcome = session.borrow_mut().complete_render(finished).map_err(to_js)?;
            Ok(JsValue::from_str(outcome_label(outcome)))
        })
    }

    #[wasm_bindgen(getter, js_name = isLoaded)]
    pub fn is_loaded(&self) -> bool {
        self.session.borrow().is_loaded()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.session.borrow().page_count()
    }

    #[wasm_bindgen(getter, js_name = currentPage)]
    pub fn current_page(&self) -> u32 {
        self.session.borrow().current_page()
    }

    #[wasm_bindgen(getter)]
    pub fn scale(&self) -> f64 {
        self.session.borrow().scale()
    }

    /// Width of the latest rendered canvas, if any
    #[wasm_bindgen(getter, js_name = displayWidth)]
    pub fn display_width(&self) -> Option<f64> {
        self.session.borrow().display_dimensions().map(|size| size.width)
    }

    #[wasm_bindgen(getter, js_name = displayHeight)]
    pub fn display_height(&self) -> Option<f64> {
        self.session.borrow().display_dimensions().map(|size| size.height)
    }

    // ============ Navigation and zoom ============
    // These only change state; call `render()` afterwards.

    #[wasm_bindgen(js_name = goToPage)]
    pub fn go_to_page(&self, page: u32) -> bool {
        self.session.borrow_mut().go_to_page(page)
    }

    #[wasm_bindgen(js_name = nextPage)]
    pub fn next_page(&self) -> bool {
        self.session.borrow_mut().next_page()
    }

    #[wasm_bindgen(js_name = previousPage)]
    pub fn previous_page(&self) -> bool {
        self.session.borrow_mut().previous_page()
    }

    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self) -> bool {
        self.session.borrow_mut().zoom_in()
    }

    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self) -> bool {
        self.session.borrow_mut().zoom_out()
    }

    #[wasm_bindgen(js_name = canZoomIn)]
    pub fn can_zoom_in(&self) -> bool {
        self.session.borrow().can_zoom_in()
    }

    #[wasm_bindgen(js_name = canZoomOut)]
    pub fn can_zoom_out(&self) -> bool {
        self.session.borrow().can_zoom_out()
    }

    // ============ Annotations ============

    /// Add a placeholder text label at the center of the current page.
    /// Returns the new annotation's id.
    #[wasm_bindgen(js_name = addText)]
    pub fn add_text(&self) -> Result<String, JsValue> {
        let id = self.session.borrow_mut().add_text().map_err(to_js)?;
        Ok(id.to_string())
    }

    /// Add an empty signature box and reset the signature pad for it.
    #[wasm_bindgen(js_name = addSignature)]
    pub fn add_signature(&mut self) -> Result<String, JsValue> {
        let mut session = self.session.borrow_mut();
        let id = session.add_signature().map_err(to_js)?;
        self.pad = session.signature_pad();
        Ok(id.to_string())
    }

    #[wasm_bindgen(js_name = updateText)]
    pub fn update_text(&self, id: &str, text: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        Ok(self.session.borrow_mut().update(id, &AnnotationPatch::text(text)))
    }

    #[wasm_bindgen(js_name = setEditing)]
    pub fn set_editing(&self, id: &str, editing: bool) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        Ok(self.session.borrow_mut().update(id, &AnnotationPatch::editing(editing)))
    }

    /// Apply a partial update, e.g. `{"color":"#ff0000","font_size":20}`.
    /// Returns false if the annotation is not found or nothing changed.
    #[wasm_bindgen(js_name = updateAnnotation)]
    pub fn update_annotation(&self, id: &str, patch_json: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        let patch = parse_patch(patch_json).map_err(to_js)?;
        Ok(self.session.borrow_mut().update(id, &patch))
    }

    pub fn delete(&self, id: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        Ok(self.session.borrow_mut().delete(id))
    }

    /// Restore the annotations to the previous snapshot.
    /// Returns false at the start of history.
    pub fn undo(&self) -> bool {
        self.session.borrow_mut().undo()
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.session.borrow().can_undo()
    }

    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&self) {
        self.session.borrow_mut().clear_all();
    }

    // ============ Dragging ============
    // One drag is one undo step: pointerdown -> beginDrag, pointermove ->
    // dragTo, pointerup -> endDrag.

    #[wasm_bindgen(js_name = beginDrag)]
    pub fn begin_drag(&self) {
        self.session.borrow_mut().begin_drag();
    }

    #[wasm_bindgen(js_name = dragTo)]
    pub fn drag_to(&self, id: &str, x: f64, y: f64) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        Ok(self.session.borrow_mut().drag_to(id, x, y))
    }

    #[wasm_bindgen(js_name = endDrag)]
    pub fn end_drag(&self) -> bool {
        self.session.borrow_mut().end_drag()
    }

    // ============ Signature pad ============

    #[wasm_bindgen(js_name = padPointerDown)]
    pub fn pad_pointer_down(&mut self, x: f64, y: f64) {
        self.pad.pointer_down(Point::new(x, y));
    }

    #[wasm_bindgen(js_name = padPointerMove)]
    pub fn pad_pointer_move(&mut self, x: f64, y: f64) {
        self.pad.pointer_move(Point::new(x, y));
    }

    #[wasm_bindgen(js_name = padPointerUp)]
    pub fn pad_pointer_up(&mut self) {
        self.pad.pointer_up();
    }

    #[wasm_bindgen(js_name = padPointerLeave)]
    pub fn pad_pointer_leave(&mut self) {
        self.pad.pointer_leave();
    }

    #[wasm_bindgen(js_name = padClear)]
    pub fn pad_clear(&mut self) {
        self.pad.clear();
    }

    #[wasm_bindgen(js_name = padIsEmpty)]
    pub fn pad_is_empty(&self) -> bool {
        self.pad.is_empty()
    }

    /// Strokes on the pad so far, for redrawing it
    #[wasm_bindgen(js_name = padStrokesJson)]
    pub fn pad_strokes_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.pad.strokes())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Store the pad's content on a signature annotation and reset the pad.
    /// `format` is "strokes" or "image".
    #[wasm_bindgen(js_name = saveSignature)]
    pub fn save_signature(&mut self, id: &str, format: &str) -> Result<bool, JsValue> {
        let id = parse_id(id).map_err(to_js)?;
        let format = parse_format(format).map_err(to_js)?;
        let content = self.pad.save(format).map_err(to_js)?;

        let mut session = self.session.borrow_mut();
        let signed = session.sign(id, content);
        self.pad = session.signature_pad();
        Ok(signed)
    }

    // ============ State for the overlay ============

    /// All annotations as JSON, tagged by `type`
    #[wasm_bindgen(js_name = annotationsJson)]
    pub fn annotations_json(&self) -> Result<String, JsValue> {
        self.session
            .borrow()
            .model()
            .to_json()
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Annotations on the current page as JSON
    #[wasm_bindgen(js_name = currentPageAnnotationsJson)]
    pub fn current_page_annotations_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.borrow().annotations_on_current_page())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Inline error messages: `{ load, render, export }`, null when clear
    pub fn errors(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.session.borrow().errors())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    // ============ Export ============

    /// Burn the annotations into a copy of the document and publish it as an
    /// object URL. The previous export's URL is revoked.
    /// Returns `{ url, file_name, mime_type, skipped }`.
    pub fn export(&mut self) -> Result<JsValue, JsValue> {
        let mut session = self.session.borrow_mut();
        let exported = session.export().map_err(to_js)?;

        let download = ObjectUrl::from_bytes(&exported.bytes, &exported.mime_type)?;
        let summary = ExportSummary {
            url: download.as_str().to_string(),
            file_name: exported.file_name.clone(),
            mime_type: exported.mime_type.clone(),
            skipped: exported
                .skipped
                .iter()
                .map(|s| SkippedEntry {
                    id: s.id.to_string(),
                    page: s.page,
                    reason: s.reason.to_string(),
                })
                .collect(),
        };
        self.download = Some(download);

        serde_wasm_bindgen::to_value(&summary)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// URL of the latest export, if it is still current
    #[wasm_bindgen(getter, js_name = downloadUrl)]
    pub fn download_url(&self) -> Option<String> {
        self.download.as_ref().map(|url| url.as_str().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ExportSummary {
    url: String,
    file_name: String,
    mime_type: String,
    skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Serialize)]
struct SkippedEntry {
    id: String,
    page: u32,
    reason: String,
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_id(id: &str) -> Result<AnnotationId, String> {
    AnnotationId::from_str(id).map_err(|e| format!("Invalid annotation id '{}': {}", id, e))
}

fn parse_format(format: &str) -> Result<CaptureFormat, String> {
    match format.to_lowercase().as_str() {
        "strokes" => Ok(CaptureFormat::Strokes),
        "image" | "png" => Ok(CaptureFormat::Image),
        other => Err(format!("Unknown signature format '{}'", other)),
    }
}

fn parse_patch(json: &str) -> Result<AnnotationPatch, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid patch JSON: {}", e))
}

fn outcome_label(outcome: RenderOutcome) -> &'static str {
    match outcome {
        RenderOutcome::Applied(_) => "applied",
        RenderOutcome::Superseded => "superseded",
    }
}


// WASM-specific tests that run in a browser environment
#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn blank_canvas() -> js_sys::Function {
        js_sys::Function::new_with_args("bytes, page, scale, width, height", "return { page, width, height };")
    }

    #[wasm_bindgen_test]
    fn test_editor_starts_empty() {
        let editor = AnnotatorEditor::new(blank_canvas(), None).unwrap();
        assert!(!editor.is_loaded());
        assert_eq!(editor.page_count(), 0);
        assert_eq!(editor.scale(), 1.5);
        assert!(editor.add_text().is_err());
    }

    #[wasm_bindgen_test]
    fn test_config_override() {
        let editor = AnnotatorEditor::new(blank_canvas(), Some("[view]\ninitial_scale = 1.0".to_string())).unwrap();
        assert_eq!(editor.scale(), 1.0);
        assert!(AnnotatorEditor::new(blank_canvas(), Some("[view".to_string())).is_err());
    }

    #[wasm_bindgen_test]
    fn test_rejected_upload_reports_error() {
        let mut editor = AnnotatorEditor::new(blank_canvas(), None).unwrap();
        assert!(editor.open("notes.txt", "text/plain", b"hello".to_vec()).is_err());
        assert!(!editor.is_loaded());
    }
}
