//! Document loading and page rendering
//!
//! Rasterization itself is delegated to a [`PageRasterizer`]. The engine
//! owns the loaded bytes, the page geometry and the surface of the latest
//! render, and decides which completed render gets displayed.
//!
//! A render is split into three steps so callers that share the engine
//! behind a `RefCell` never hold a borrow across an await:
//!
//! 1. [`RenderEngine::prepare`] validates the request and issues a ticket
//! 2. [`RenderJob::run`] awaits the rasterizer
//! 3. [`RenderEngine::complete`] applies the result if its ticket is still the latest

use std::rc::Rc;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use lopdf::Document;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coords::{Size, Viewport};
use crate::error::{DocumentLoadError, PageRenderError};
use crate::page_info::PageGeometry;

/// Upper bound for `PaperRasterizer` surfaces (about 256 MB of RGBA)
const MAX_SURFACE_PIXELS: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentSummary {
    pub page_count: u32,
    pub pages: Vec<PageGeometry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterRequest {
    pub page: u32,
    pub viewport: Viewport,
}

/// Draws one page of a document at a viewport.
///
/// Futures run on a single thread and need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait PageRasterizer {
    type Surface;

    async fn rasterize(
        &self,
        source: Arc<[u8]>,
        request: RasterRequest,
    ) -> Result<Self::Surface, PageRenderError>;
}

/// Paints a blank white sheet at the viewport size.
///
/// Stands in for a real renderer where only the geometry matters: headless
/// sessions and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaperRasterizer;

impl PageRasterizer for PaperRasterizer {
    type Surface = RgbaImage;

    async fn rasterize(
        &self,
        _source: Arc<[u8]>,
        request: RasterRequest,
    ) -> Result<RgbaImage, PageRenderError> {
        let canvas = request.viewport.canvas;
        let (width, height) = (canvas.width.round(), canvas.height.round());
        // Compared in f64: the pixel count of a huge box overflows u64
        if !(width >= 1.0 && height >= 1.0) || width * height > MAX_SURFACE_PIXELS as f64 {
            return Err(PageRenderError::Backend(format!(
                "cannot allocate a {}x{} surface",
                width, height
            )));
        }
        Ok(RgbaImage::from_pixel(
            width as u32,
            height as u32,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage<S> {
    pub page: u32,
    pub viewport: Viewport,
    pub surface: S,
}

/// A render that has been issued a ticket but not yet run
pub struct RenderJob<R: PageRasterizer> {
    ticket: u64,
    request: RasterRequest,
    source: Arc<[u8]>,
    rasterizer: Rc<R>,
}

impl<R: PageRasterizer> RenderJob<R> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn request(&self) -> RasterRequest {
        self.request
    }

    pub async fn run(self) -> FinishedRender<R::Surface> {
        let result = self
            .rasterizer
            .rasterize(self.source, self.request)
            .await;
        FinishedRender {
            ticket: self.ticket,
            request: self.request,
            result,
        }
    }
}

pub struct FinishedRender<S> {
    ticket: u64,
    request: RasterRequest,
    result: Result<S, PageRenderError>,
}

impl<S> FinishedRender<S> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    /// The render was the latest request and is now displayed
    Applied(Viewport),
    /// A newer request was issued while this one ran; the result was dropped
    Superseded,
}

struct LoadedDocument {
    bytes: Arc<[u8]>,
    pages: Vec<PageGeometry>,
}

pub struct RenderEngine<R: PageRasterizer> {
    rasterizer: Rc<R>,
    document: Option<LoadedDocument>,
    current: Option<RenderedPage<R::Surface>>,
    generation: u64,
}

impl<R: PageRasterizer> RenderEngine<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer: Rc::new(rasterizer),
            document: None,
            current: None,
            generation: 0,
        }
    }

    /// Parse `bytes` and make them the current document.
    ///
    /// The previous document and surface are dropped before parsing, so a
    /// failed load leaves the engine empty. Renders still in flight for the
    /// old document are superseded.
    pub fn load(&mut self, bytes: impl Into<Arc<[u8]>>) -> Result<DocumentSummary, DocumentLoadError> {
        let bytes: Arc<[u8]> = bytes.into();
        self.unload();

        let doc = Document::load_mem(&bytes).map_err(|e| {
            warn!(error = %e, "Failed to parse document");
            DocumentLoadError::ParseError(e.to_string())
        })?;

        if doc.is_encrypted() {
            return Err(DocumentLoadError::Encrypted);
        }

        let pages = PageGeometry::all_from_document(&doc).map_err(DocumentLoadError::ParseError)?;
        if pages.is_empty() {
            return Err(DocumentLoadError::NoPages);
        }

        info!(pages = pages.len(), bytes = bytes.len(), "Loaded document");
        let summary = DocumentSummary {
            page_count: pages.len() as u32,
            pages: pages.clone(),
        };
        self.document = Some(LoadedDocument { bytes, pages });
        Ok(summary)
    }

    /// Drop the document, the surface and any in-flight render.
    pub fn unload(&mut self) {
        self.document = None;
        self.current = None;
        self.generation += 1;
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    pub fn source(&self) -> Option<&Arc<[u8]>> {
        self.document.as_ref().map(|d| &d.bytes)
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |d| d.pages.len() as u32)
    }

    pub fn page_size(&self, page: u32) -> Option<Size> {
        self.geometry(page).map(|g| g.size)
    }

    pub fn geometry(&self, page: u32) -> Option<&PageGeometry> {
        let index = usize::try_from(page.checked_sub(1)?).ok()?;
        self.document.as_ref()?.pages.get(index)
    }

    /// Canvas size of the latest applied render
    pub fn display_dimensions(&self) -> Option<Size> {
        self.current.as_ref().map(|c| c.viewport.canvas)
    }

    pub fn current(&self) -> Option<&RenderedPage<R::Surface>> {
        self.current.as_ref()
    }

    /// Validate a request and issue it the next ticket. Any earlier job
    /// becomes superseded, including when this request fails validation.
    pub fn prepare(&mut self, page: u32, scale: f64) -> Result<RenderJob<R>, PageRenderError> {
        self.generation += 1;
        let job = self.validate(page, scale).map(|(request, source)| RenderJob {
            ticket: self.generation,
            request,
            source,
            rasterizer: Rc::clone(&self.rasterizer),
        });
        if let Err(e) = &job {
            warn!(page, scale, error = %e, "Rejected render request");
            self.current = None;
        }
        job
    }

    fn validate(&self, page: u32, scale: f64) -> Result<(RasterRequest, Arc<[u8]>), PageRenderError> {
        let document = self.document.as_ref().ok_or(PageRenderError::NoDocument)?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PageRenderError::InvalidScale(scale));
        }
        let total = document.pages.len() as u32;
        let geometry = self
            .geometry(page)
            .ok_or(PageRenderError::PageOutOfRange { page, total })?;
        let request = RasterRequest {
            page,
            viewport: Viewport::at_scale(geometry.size, scale),
        };
        Ok((request, Arc::clone(&document.bytes)))
    }

    /// Apply a finished render if nothing newer was requested since.
    ///
    /// A failed latest render clears the surface so the previous page is no
    /// longer reported as current.
    pub fn complete(
        &mut self,
        finished: FinishedRender<R::Surface>,
    ) -> Result<RenderOutcome, PageRenderError> {
        if finished.ticket != self.generation {
            debug!(
                ticket = finished.ticket,
                latest = self.generation,
                page = finished.request.page,
                "Discarding superseded render"
            );
            return Ok(RenderOutcome::Superseded);
        }

        match finished.result {
            Ok(surface) => {
                let viewport = finished.request.viewport;
                debug!(page = finished.request.page, scale = viewport.scale, "Render applied");
                self.current = Some(RenderedPage {
                    page: finished.request.page,
                    viewport,
                    surface,
                });
                Ok(RenderOutcome::Applied(viewport))
            }
            Err(e) => {
                warn!(page = finished.request.page, error = %e, "Render failed");
                self.current = None;
                Err(e)
            }
        }
    }

    /// prepare, run and complete in one call, for callers that own the engine.
    pub async fn render_page(&mut self, page: u32, scale: f64) -> Result<RenderOutcome, PageRenderError> {
        let job = self.prepare(page, scale)?;
        let finished = job.run().await;
        self.complete(finished)
    }
}
