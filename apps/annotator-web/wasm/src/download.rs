//! Transient object URLs for exported documents

use wasm_bindgen::JsValue;
use web_sys::{Blob, BlobPropertyBag, Url};

/// A `blob:` URL that is revoked when dropped.
///
/// The editor keeps only the URL of its latest export, so replacing it
/// releases the previous blob.
pub struct ObjectUrl {
    url: String,
}

impl ObjectUrl {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Result<Self, JsValue> {
        let array = js_sys::Uint8Array::from(bytes);
        let parts = js_sys::Array::of1(&array);

        let options = BlobPropertyBag::new();
        options.set_type(mime_type);
        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;

        let url = Url::create_object_url_with_blob(&blob)?;
        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        // Nothing to do if the browser already forgot it
        let _ = Url::revoke_object_url(&self.url);
    }
}

#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_object_url_is_blob_url() {
        let url = ObjectUrl::from_bytes(b"%PDF-1.7", "application/pdf").unwrap();
        assert!(url.as_str().starts_with("blob:"));
    }
}
