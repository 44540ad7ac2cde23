//! Burn annotations into a copy of the source PDF
//!
//! Each annotated page gets one appended content stream holding all of its
//! annotations. The page's existing content is wrapped in `q ... Q` first so
//! any graphics state it leaves behind does not leak into the overlay.

use std::io::Write;

use flate2::{write::ZlibEncoder, Compression};
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat,
};
use tracing::{debug, info, warn};

use crate::annotation::{Annotation, AnnotationId, SignatureAnnotation, SignatureContent, TextAnnotation};
use crate::coords::{PageTransform, Point, Size};
use crate::error::{AnnotationError, ExportError, SkippedAnnotation};
use crate::model::group_by_page;
use crate::page_info::{inherited, resolve, PageGeometry};

/// Tuning for how annotations land on the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeOptions {
    /// Share of the font size between the top of a line and its baseline
    pub text_baseline_ratio: f64,
    /// Line advance as a multiple of the font size
    pub line_height: f64,
    /// Signature images are drawn at this fraction of their pixel size
    pub signature_image_scale: f64,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            text_baseline_ratio: 0.8,
            line_height: 1.2,
            signature_image_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeReport {
    pub bytes: Vec<u8>,
    pub drawn: Vec<AnnotationId>,
    pub skipped: Vec<SkippedAnnotation>,
}

/// Draw `annotations` onto a new copy of `source`.
///
/// `canvas_for` returns the display canvas size each page was last rendered
/// at; annotation positions are converted from that canvas to page space.
/// Annotations that cannot be drawn are skipped and listed in the report.
/// Only a source that fails to parse or a document that fails to serialize
/// fails the whole call.
pub fn composite(
    source: &[u8],
    annotations: &[Annotation],
    canvas_for: impl Fn(u32) -> Option<Size>,
    options: &CompositeOptions,
) -> Result<CompositeReport, ExportError> {
    if annotations.is_empty() {
        return Ok(CompositeReport {
            bytes: source.to_vec(),
            drawn: Vec::new(),
            skipped: Vec::new(),
        });
    }

    let mut doc = Document::load_mem(source).map_err(|e| ExportError::ParseError(e.to_string()))?;
    let pages = doc.get_pages();

    let mut drawn = Vec::new();
    let mut skipped = Vec::new();

    for (page, page_annotations) in group_by_page(annotations) {
        let skip_all = |reason: AnnotationError, skipped: &mut Vec<SkippedAnnotation>| {
            for annotation in &page_annotations {
                warn!(id = %annotation.id(), page, %reason, "Skipping annotation");
                skipped.push(SkippedAnnotation {
                    id: annotation.id(),
                    page,
                    reason: reason.clone(),
                });
            }
        };

        let Some(&page_id) = pages.get(&page) else {
            skip_all(AnnotationError::MissingPage(page), &mut skipped);
            continue;
        };
        let geometry = match PageGeometry::from_page_id(&doc, page, page_id) {
            Ok(geometry) => geometry,
            Err(e) => {
                skip_all(AnnotationError::OperationError(e), &mut skipped);
                continue;
            }
        };
        let Some(transform) = canvas_for(page).and_then(|canvas| PageTransform::new(geometry.size, canvas))
        else {
            skip_all(AnnotationError::UnknownCanvas(page), &mut skipped);
            continue;
        };

        let mut overlay = match PageOverlay::for_page(&doc, page_id) {
            Ok(overlay) => overlay,
            Err(e) => {
                skip_all(e, &mut skipped);
                continue;
            }
        };

        let mut page_drawn = Vec::new();
        for annotation in &page_annotations {
            match overlay.draw(&mut doc, &transform, annotation, options) {
                Ok(()) => page_drawn.push(annotation.id()),
                Err(reason) => {
                    warn!(id = %annotation.id(), page, %reason, "Skipping annotation");
                    skipped.push(SkippedAnnotation {
                        id: annotation.id(),
                        page,
                        reason,
                    });
                }
            }
        }

        if page_drawn.is_empty() {
            continue;
        }
        match overlay.attach(&mut doc, page_id) {
            Ok(()) => {
                debug!(page, count = page_drawn.len(), "Flattened annotations onto page");
                drawn.extend(page_drawn);
            }
            Err(reason) => {
                for id in page_drawn {
                    warn!(%id, page, %reason, "Skipping annotation");
                    skipped.push(SkippedAnnotation {
                        id,
                        page,
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;

    info!(
        drawn = drawn.len(),
        skipped = skipped.len(),
        bytes = bytes.len(),
        "Composited annotations"
    );
    Ok(CompositeReport {
        bytes,
        drawn,
        skipped,
    })
}

/// Content and resources being built up for one page
struct PageOverlay {
    resources: Dictionary,
    font_name: Option<Vec<u8>>,
    operations: Vec<Operation>,
}

impl PageOverlay {
    /// Start from a private copy of the page's effective resources
    fn for_page(doc: &Document, page_id: ObjectId) -> Result<Self, AnnotationError> {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| AnnotationError::OperationError(e.to_string()))?;

        let resources = match inherited(doc, page, b"Resources") {
            Some(obj) => resolve(doc, obj)
                .as_dict()
                .map_err(|e| AnnotationError::OperationError(format!("Resources: {}", e)))?
                .clone(),
            None => Dictionary::new(),
        };

        Ok(Self {
            resources,
            font_name: None,
            operations: Vec::new(),
        })
    }

    fn draw(
        &mut self,
        doc: &mut Document,
        transform: &PageTransform,
        annotation: &Annotation,
        options: &CompositeOptions,
    ) -> Result<(), AnnotationError> {
        let ops = match annotation {
            Annotation::Text(text) => self.text_operations(doc, transform, text, options)?,
            Annotation::Signature(signature) => match &signature.content {
                SignatureContent::Strokes(_) => stroke_operations(transform, signature),
                SignatureContent::Image(image) => {
                    let placed = PlacedImage::decode(&image.png)?;
                    let name = self.register_image(doc, placed.xobject()?)?;
                    image_operations(transform, signature, &placed, &name, options)
                }
            },
        };
        self.operations.extend(ops);
        Ok(())
    }

    fn text_operations(
        &mut self,
        doc: &mut Document,
        transform: &PageTransform,
        text: &TextAnnotation,
        options: &CompositeOptions,
    ) -> Result<Vec<Operation>, AnnotationError> {
        if text.text.is_empty() {
            return Ok(Vec::new());
        }
        let font = self.font(doc)?;
        let font_size = transform.scale_magnitude(text.font_size);
        let adjustment = text.font_size * transform.factors().y * options.text_baseline_ratio;
        let origin = transform.to_document_space(Point::new(text.x, text.y), adjustment);
        let (r, g, b) = text.color.normalized();

        let mut ops = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font), real(font_size)]),
            Operation::new("TL", vec![real(font_size * options.line_height)]),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new("Td", vec![real(origin.x), real(origin.y)]),
        ];
        for (i, line) in text.text.split('\n').enumerate() {
            if i > 0 {
                ops.push(Operation::new("T*", vec![]));
            }
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
            ));
        }
        ops.push(Operation::new("ET", vec![]));
        ops.push(Operation::new("Q", vec![]));
        Ok(ops)
    }

    /// Name of the overlay's Helvetica font, added on first use
    fn font(&mut self, doc: &mut Document) -> Result<Vec<u8>, AnnotationError> {
        if let Some(name) = &self.font_name {
            return Ok(name.clone());
        }
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let name = self.insert_resource(doc, b"Font", "AnnF", font_id)?;
        self.font_name = Some(name.clone());
        Ok(name)
    }

    fn register_image(&mut self, doc: &mut Document, xobject: ImageXObject) -> Result<Vec<u8>, AnnotationError> {
        let smask_id = doc.add_object(xobject.smask);
        let mut image = xobject.image;
        image.dict.set("SMask", smask_id);
        let image_id = doc.add_object(image);
        self.insert_resource(doc, b"XObject", "AnnSig", image_id)
    }

    /// Add `id` to a resource category under a name not already in use
    fn insert_resource(
        &mut self,
        doc: &Document,
        category: &[u8],
        prefix: &str,
        id: ObjectId,
    ) -> Result<Vec<u8>, AnnotationError> {
        let mut entries = match self.resources.get(category) {
            Ok(obj) => resolve(doc, obj)
                .as_dict()
                .map_err(|e| AnnotationError::OperationError(e.to_string()))?
                .clone(),
            Err(_) => Dictionary::new(),
        };
        let name = (1..)
            .map(|n| format!("{}{}", prefix, n).into_bytes())
            .find(|name| !entries.has(name))
            .unwrap_or_else(|| prefix.as_bytes().to_vec());
        entries.set(name.clone(), id);
        self.resources.set(category.to_vec(), entries);
        Ok(name)
    }

    /// Write the resources back to the page and append the overlay stream.
    fn attach(self, doc: &mut Document, page_id: ObjectId) -> Result<(), AnnotationError> {
        // Streams are concatenated when read, so keep a token boundary at the seam
        let mut overlay = b"\n".to_vec();
        overlay.extend(
            Content {
                operations: std::iter::once(Operation::new("Q", vec![]))
                    .chain(self.operations)
                    .collect::<Vec<_>>(),
            }
            .encode()
            .map_err(|e| AnnotationError::OperationError(e.to_string()))?,
        );

        let existing = existing_contents(doc, page_id)?;
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

        let contents: Vec<Object> = std::iter::once(save_id)
            .chain(existing)
            .chain(std::iter::once(overlay_id))
            .map(Object::Reference)
            .collect();

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| AnnotationError::OperationError(e.to_string()))?;
        page.set("Resources", self.resources);
        page.set("Contents", contents);
        Ok(())
    }
}

/// Content stream ids of a page, in drawing order
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>, AnnotationError> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| AnnotationError::OperationError(e.to_string()))?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    let items: Vec<&Object> = match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(array)) => array.iter().collect(),
            _ => vec![contents],
        },
        Object::Array(array) => array.iter().collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|obj| {
            obj.as_reference()
                .map_err(|_| AnnotationError::OperationError("inline page contents".to_string()))
        })
        .collect()
}

fn stroke_operations(transform: &PageTransform, signature: &SignatureAnnotation) -> Vec<Operation> {
    let SignatureContent::Strokes(strokes) = &signature.content else {
        return Vec::new();
    };
    let (r, g, b) = signature.color.normalized();
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("RG", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new("w", vec![real(transform.scale_magnitude(signature.line_width))]),
        // Round caps and joins, as the capture surface draws them
        Operation::new("J", vec![Object::Integer(1)]),
        Operation::new("j", vec![Object::Integer(1)]),
    ];
    let mut painted = false;
    for stroke in strokes {
        let mut points = stroke.points.iter().map(|p| {
            transform.to_document_space(Point::new(signature.x + p.x, signature.y + p.y), 0.0)
        });
        let Some(start) = points.next() else {
            continue;
        };
        ops.push(Operation::new("m", vec![real(start.x), real(start.y)]));
        let mut segments = 0;
        for point in points {
            ops.push(Operation::new("l", vec![real(point.x), real(point.y)]));
            segments += 1;
        }
        if segments == 0 {
            // A single tap still leaves a round dot
            ops.push(Operation::new("l", vec![real(start.x), real(start.y)]));
        }
        painted = true;
    }
    if !painted {
        return Vec::new();
    }
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

fn image_operations(
    transform: &PageTransform,
    signature: &SignatureAnnotation,
    placed: &PlacedImage,
    name: &[u8],
    options: &CompositeOptions,
) -> Vec<Operation> {
    let width = placed.width as f64 * options.signature_image_scale;
    let height = placed.height as f64 * options.signature_image_scale;
    let origin = transform.to_document_space(Point::new(signature.x, signature.y), height);
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(width),
                real(0.0),
                real(0.0),
                real(height),
                real(origin.x),
                real(origin.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// A decoded signature PNG split into color and alpha planes
struct PlacedImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Vec<u8>,
}

struct ImageXObject {
    image: Stream,
    smask: Stream,
}

impl PlacedImage {
    fn decode(png: &[u8]) -> Result<Self, AnnotationError> {
        let rgba = image::load_from_memory_with_format(png, image::ImageFormat::Png)
            .map_err(|e| AnnotationError::InvalidImage(e.to_string()))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(AnnotationError::InvalidImage("image has no pixels".to_string()));
        }

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }
        Ok(Self {
            width,
            height,
            rgb,
            alpha,
        })
    }

    fn xobject(&self) -> Result<ImageXObject, AnnotationError> {
        let plane = |color_space: &str, data: &[u8]| -> Result<Stream, AnnotationError> {
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => self.width as i64,
                "Height" => self.height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            };
            Ok(Stream::new(dict, deflate(data)?))
        };
        Ok(ImageXObject {
            image: plane("DeviceRGB", &self.rgb)?,
            smask: plane("DeviceGray", &self.alpha)?,
        })
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, AnnotationError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| AnnotationError::OperationError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| AnnotationError::OperationError(e.to_string()))
}

/// Helvetica is set up with WinAnsiEncoding; anything beyond Latin-1 becomes '?'
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| *c != '\r')
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}
