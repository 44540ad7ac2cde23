//! Page rasterization delegated to a JavaScript PDF.js callback
//!
//! The callback is called as `draw(bytes, page, scale, width, height)` and
//! may return a value or a Promise. Whatever it resolves to becomes the
//! rendered surface (usually the canvas it drew into).

use std::cell::RefCell;
use std::sync::Arc;

use annotator_core::{PageRasterizer, PageRenderError, RasterRequest};
use js_sys::{Array, Function, Promise, Uint8Array};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

pub struct PdfJsRasterizer {
    draw: Function,
    /// JS copy of the last document handed to `draw`
    shared: RefCell<Option<(Arc<[u8]>, Uint8Array)>>,
}

impl PdfJsRasterizer {
    pub fn new(draw: Function) -> Self {
        Self {
            draw,
            shared: RefCell::new(None),
        }
    }

    /// Copy the document into JS memory once per loaded document.
    fn js_bytes(&self, source: &Arc<[u8]>) -> Uint8Array {
        let mut shared = self.shared.borrow_mut();
        match shared.as_ref() {
            Some((bytes, array)) if Arc::ptr_eq(bytes, source) => array.clone(),
            _ => {
                let array = Uint8Array::from(&source[..]);
                *shared = Some((Arc::clone(source), array.clone()));
                array
            }
        }
    }
}

impl PageRasterizer for PdfJsRasterizer {
    type Surface = JsValue;

    async fn rasterize(
        &self,
        source: Arc<[u8]>,
        request: RasterRequest,
    ) -> Result<JsValue, PageRenderError> {
        let canvas = request.viewport.canvas;
        let args = Array::of5(
            &self.js_bytes(&source),
            &JsValue::from(request.page),
            &JsValue::from_f64(request.viewport.scale),
            &JsValue::from_f64(canvas.width),
            &JsValue::from_f64(canvas.height),
        );

        let returned = self
            .draw
            .apply(&JsValue::NULL, &args)
            .map_err(|e| PageRenderError::Backend(describe(&e)))?;

        JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| PageRenderError::Backend(describe(&e)))
    }
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}
