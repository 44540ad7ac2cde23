//! Freehand signature capture
//!
//! The pad records one stroke per pointer-down to pointer-up gesture in its
//! own pixel space (origin top-left). Saving yields either the vector strokes
//! or a PNG on a transparent background.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use crate::annotation::{Color, SignatureContent, SignatureImage, Stroke};
use crate::coords::Point;
use crate::error::SignatureError;

pub const DEFAULT_PAD_WIDTH: u32 = 400;
pub const DEFAULT_PAD_HEIGHT: u32 = 200;
pub const DEFAULT_LINE_WIDTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Strokes,
    Image,
}

#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    line_width: f64,
    color: Color,
    strokes: Vec<Stroke>,
    drawing: bool,
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new(DEFAULT_PAD_WIDTH, DEFAULT_PAD_HEIGHT)
    }
}

impl SignaturePad {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            line_width: DEFAULT_LINE_WIDTH,
            color: Color::BLACK,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    pub fn with_pen(mut self, color: Color, line_width: f64) -> Self {
        self.color = color;
        self.line_width = line_width;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn pointer_down(&mut self, point: Point) {
        self.strokes.push(Stroke {
            points: vec![point],
        });
        self.drawing = true;
    }

    /// Extends the current stroke. Ignored unless the pointer is down.
    pub fn pointer_move(&mut self, point: Point) {
        if !self.drawing {
            return;
        }
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.points.push(point);
        }
    }

    pub fn pointer_up(&mut self) {
        self.drawing = false;
    }

    pub fn pointer_leave(&mut self) {
        self.drawing = false;
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Discard every stroke, including one still in progress.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.points.is_empty())
    }

    pub fn save(&self, format: CaptureFormat) -> Result<SignatureContent, SignatureError> {
        match format {
            CaptureFormat::Strokes => Ok(SignatureContent::Strokes(self.strokes.clone())),
            CaptureFormat::Image => {
                let png = encode_png(self.rasterize())?;
                debug!(bytes = png.len(), strokes = self.strokes.len(), "Saved signature image");
                Ok(SignatureContent::Image(SignatureImage::from_png(png)))
            }
        }
    }

    /// Paint the strokes onto a transparent surface of the pad's size.
    pub fn rasterize(&self) -> RgbaImage {
        let mut surface = RgbaImage::new(self.width, self.height);
        let ink = Rgba([self.color.r, self.color.g, self.color.b, 255]);
        let radius = (self.line_width / 2.0).max(0.5);

        for stroke in &self.strokes {
            match stroke.points.as_slice() {
                [] => {}
                [only] => stamp(&mut surface, *only, radius, ink),
                points => {
                    for pair in points.windows(2) {
                        draw_segment(&mut surface, pair[0], pair[1], radius, ink);
                    }
                }
            }
        }
        surface
    }
}

fn draw_segment(surface: &mut RgbaImage, from: Point, to: Point, radius: f64, ink: Rgba<u8>) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let length = (dx * dx + dy * dy).sqrt();
    // Stamp spacing below the radius keeps the line free of gaps
    let steps = (length / (radius * 0.5)).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        stamp(surface, Point::new(from.x + dx * t, from.y + dy * t), radius, ink);
    }
}

fn stamp(surface: &mut RgbaImage, center: Point, radius: f64, ink: Rgba<u8>) {
    let (w, h) = (surface.width() as i64, surface.height() as i64);
    let min_x = ((center.x - radius).floor() as i64).max(0);
    let max_x = ((center.x + radius).ceil() as i64).min(w - 1);
    let min_y = ((center.y - radius).floor() as i64).max(0);
    let max_y = ((center.y + radius).ceil() as i64).min(h - 1);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f64 + 0.5 - center.x;
            let py = y as f64 + 0.5 - center.y;
            if px * px + py * py <= radius * radius {
                surface.put_pixel(x as u32, y as u32, ink);
            }
        }
    }
}

pub(crate) fn encode_png(surface: RgbaImage) -> Result<Vec<u8>, SignatureError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(surface)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| SignatureError::Encode(e.to_string()))?;
    Ok(bytes)
}
