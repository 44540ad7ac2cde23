//! Coordinate transformation between display and PDF coordinate systems
//!
//! Display space is the rendered canvas: origin top-left, Y down, pixels at
//! the render scale. Document space is the page's native space: origin
//! bottom-left, Y up, PDF points.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when both sides are finite and strictly positive
    pub fn is_populated(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Display canvas for a page rendered at a scale, as PDF.js computes it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub page: Size,
    pub scale: f64,
    pub canvas: Size,
}

impl Viewport {
    pub fn at_scale(page: Size, scale: f64) -> Self {
        Self {
            page,
            scale,
            canvas: Size::new(page.width * scale, page.height * scale),
        }
    }
}

/// Per-axis ratio of page units to canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

/// Maps points between one page's display canvas and its PDF space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    page: Size,
    factors: ScaleFactors,
}

impl PageTransform {
    /// Returns `None` until the canvas has been populated by a render.
    pub fn new(page: Size, canvas: Size) -> Option<Self> {
        if !canvas.is_populated() || !page.is_populated() {
            return None;
        }
        Some(Self {
            page,
            factors: ScaleFactors {
                x: page.width / canvas.width,
                y: page.height / canvas.height,
            },
        })
    }

    pub fn factors(&self) -> ScaleFactors {
        self.factors
    }

    pub fn page_size(&self) -> Size {
        self.page
    }

    /// `vertical_adjustment` is the height (in page units) of the drawn
    /// glyph or image, so its visual top edge lands on the display anchor.
    pub fn to_document_space(&self, point: Point, vertical_adjustment: f64) -> Point {
        Point {
            x: point.x * self.factors.x,
            y: self.page.height - (point.y * self.factors.y) - vertical_adjustment,
        }
    }

    pub fn to_display_space(&self, point: Point, vertical_adjustment: f64) -> Point {
        Point {
            x: point.x / self.factors.x,
            y: (self.page.height - point.y - vertical_adjustment) / self.factors.y,
        }
    }

    /// Font sizes and line widths scale by the horizontal factor only.
    pub fn scale_magnitude(&self, value: f64) -> f64 {
        value * self.factors.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpopulated_canvas_has_no_transform() {
        let page = Size::new(612.0, 792.0);
        assert!(PageTransform::new(page, Size::new(0.0, 0.0)).is_none());
        assert!(PageTransform::new(page, Size::new(600.0, 0.0)).is_none());
        assert!(PageTransform::new(page, Size::new(f64::NAN, 800.0)).is_none());
    }

    #[test]
    fn test_corners() {
        let t = PageTransform::new(Size::new(612.0, 792.0), Size::new(600.0, 800.0)).unwrap();

        // Top-left display (0, 0) is the top-left of the page (0, 792)
        let p = t.to_document_space(Point::new(0.0, 0.0), 0.0);
        assert!((p.x - 0.0).abs() < 0.1);
        assert!((p.y - 792.0).abs() < 0.1);

        let p = t.to_document_space(Point::new(600.0, 800.0), 0.0);
        assert!((p.x - 612.0).abs() < 0.1);
        assert!((p.y - 0.0).abs() < 0.1);
    }

    #[test]
    fn test_sign_here_scenario_position() {
        // 600x800 page rendered at scale 1.0, 16px text at (100, 700)
        let t = PageTransform::new(Size::new(600.0, 800.0), Size::new(600.0, 800.0)).unwrap();
        let adjustment = 16.0 * t.factors().y * 0.8;
        let p = t.to_document_space(Point::new(100.0, 700.0), adjustment);
        assert_eq!(p.x, 100.0);
        assert!((p.y - 87.2).abs() < 1e-9);
    }

    #[test]
    fn test_viewport_scales_page() {
        let v = Viewport::at_scale(Size::new(612.0, 792.0), 1.5);
        assert_eq!(v.canvas, Size::new(918.0, 1188.0));
    }

    #[test]
    fn test_magnitudes_use_horizontal_factor() {
        // Non-uniform factors: 2.0 horizontally, 0.5 vertically
        let t = PageTransform::new(Size::new(600.0, 400.0), Size::new(300.0, 800.0)).unwrap();
        assert_eq!(t.scale_magnitude(16.0), 32.0);
    }
}
