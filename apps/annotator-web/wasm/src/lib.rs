//! WASM bindings for the annotated document editor
//!
//! Rust owns the editing session: the loaded document, the annotation list
//! with its undo history, zoom and page state, the signature pad and the
//! export. JavaScript handles DOM events, draws pages with PDF.js when asked
//! to and positions the overlay elements from `annotationsJson()`.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { AnnotatorEditor } from './pkg/annotator_web_wasm.js';
//!
//! await init();
//!
//! const editor = new AnnotatorEditor(async (bytes, page, scale, width, height) => {
//!     // draw `page` of `bytes` into the canvas with PDF.js
//! });
//! editor.open(file.name, file.type, new Uint8Array(await file.arrayBuffer()));
//! await editor.render();
//! const id = editor.addText();
//! editor.updateText(id, "Sign here");
//! const { url, fileName } = editor.export();
//! ```

pub mod download;
pub mod editor_handle;
pub mod pdfjs;

use annotator_core::intake;
use wasm_bindgen::prelude::*;

pub use editor_handle::AnnotatorEditor;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&"Annotator WASM initialized".into());
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Quick validation check for a PDF file
/// Returns Ok(()) if valid, Err with message if not
#[wasm_bindgen]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    intake::quick_validate(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Check a picked or dropped file before opening it.
/// Returns `{ file_name, size_bytes, version }` on success.
#[wasm_bindgen(js_name = validateUpload)]
pub fn validate_upload(file_name: &str, mime_type: &str, bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = intake::validate_upload(file_name, mime_type, bytes, intake::DEFAULT_MAX_UPLOAD_BYTES)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Get page count from PDF bytes (convenience function)
#[wasm_bindgen(js_name = getPageCount)]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    annotator_core::get_page_count(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Format bytes as human-readable string
#[wasm_bindgen]
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
