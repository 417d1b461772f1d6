//! Image-space and canvas-space geometry.
//!
//! Two coordinate spaces are involved when drawing a tiled image:
//!
//! - **Image space**: integer pixels of the unscaled source image. Tile bounds
//!   live here ([`Rect`]).
//! - **Canvas space**: floating point pixels of the viewport. A
//!   [`RenderTransform`] maps image space onto the canvas ([`CanvasRect`]).

use std::fmt;

use serde::Serialize;

// =============================================================================
// Size
// =============================================================================

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The smaller of the two dimensions.
    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }

    /// The larger of the two dimensions.
    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// A size is degenerate when either dimension is zero.
    pub fn is_degenerate(&self) -> bool {
        self.min_dimension() == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// =============================================================================
// Image-space rectangle
// =============================================================================

/// Half-open pixel rectangle `[left, right) x [top, bottom)` in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering a whole image of the given size.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Whether the interiors of the two rectangles overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{} - {},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

// =============================================================================
// Canvas-space geometry
// =============================================================================

/// A point in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl CanvasRect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The canvas itself, anchored at the origin.
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width as f32, size.height as f32)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Strict overlap test: rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &CanvasRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Overlapping part of the two rectangles, if any.
    pub fn intersection(&self, other: &CanvasRect) -> Option<CanvasRect> {
        if !self.intersects(other) {
            return None;
        }
        Some(CanvasRect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        ))
    }

    /// Closed containment test, so a centroid lying on a shared edge counts
    /// for both neighbours.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }
}

// =============================================================================
// Render transform
// =============================================================================

/// Viewport transform supplied by the gesture layer.
///
/// Image-space coordinates map to canvas space as `canvas = image * scale + offset`.
/// The scale is the final one, i.e. it already includes any fit-to-canvas
/// baseline: a scale of `1.0` draws one image pixel per canvas pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset: Point,
    /// Focal point of the current gesture, in canvas space.
    pub centroid: Point,
}

impl Default for RenderTransform {
    fn default() -> Self {
        Self::uniform(1.0, Point::default(), Point::default())
    }
}

impl RenderTransform {
    /// Transform with the same scale on both axes.
    pub fn uniform(scale: f32, offset: Point, centroid: Point) -> Self {
        Self {
            scale_x: scale,
            scale_y: scale,
            offset,
            centroid,
        }
    }

    /// Aspect-fit the image into the canvas, centred, with the centroid at the
    /// canvas centre.
    pub fn fit(image: Size, canvas: Size) -> Self {
        if image.is_degenerate() || canvas.is_degenerate() {
            return Self::default();
        }
        let scale = (canvas.width as f32 / image.width as f32)
            .min(canvas.height as f32 / image.height as f32);
        let offset = Point::new(
            (canvas.width as f32 - image.width as f32 * scale) / 2.0,
            (canvas.height as f32 - image.height as f32 * scale) / 2.0,
        );
        let centroid = Point::new(canvas.width as f32 / 2.0, canvas.height as f32 / 2.0);
        Self::uniform(scale, offset, centroid)
    }

    /// Zoom by `factor` keeping `centroid` fixed on the canvas.
    pub fn zoom_about(&self, factor: f32, centroid: Point) -> Self {
        Self {
            scale_x: self.scale_x * factor,
            scale_y: self.scale_y * factor,
            offset: Point::new(
                centroid.x - (centroid.x - self.offset.x) * factor,
                centroid.y - (centroid.y - self.offset.y) * factor,
            ),
            centroid,
        }
    }

    /// The governing scale used for sample size selection.
    pub fn max_scale(&self) -> f32 {
        self.scale_x.abs().max(self.scale_y.abs())
    }

    /// Map an image-space rectangle onto the canvas.
    pub fn apply(&self, rect: &Rect) -> CanvasRect {
        let x0 = rect.left as f32 * self.scale_x + self.offset.x;
        let x1 = rect.right as f32 * self.scale_x + self.offset.x;
        let y0 = rect.top as f32 * self.scale_y + self.offset.y;
        let y1 = rect.bottom as f32 * self.scale_y + self.offset.y;
        CanvasRect::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

// =============================================================================
// Tests
// =============================================================================
