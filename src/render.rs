//! Reference renderer.
//!
//! Composites a draw list onto an RGBA canvas in list order, so the base tile
//! ends up underneath the foreground tiles drawn after it. Tiles without a
//! bitmap are skipped and leave whatever is below them visible.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::geometry::{CanvasRect, Size};
use crate::pipeline::CanvasRegionTile;

/// Draw `tiles` onto a transparent canvas of size `canvas`.
pub fn compose(tiles: &[CanvasRegionTile], canvas: Size) -> RgbaImage {
    let mut target = RgbaImage::from_pixel(canvas.width, canvas.height, Rgba([0, 0, 0, 0]));
    let bounds = CanvasRect::from_size(canvas);

    for tile in tiles {
        let Some(bitmap) = &tile.bitmap else {
            continue;
        };
        let Some(visible) = tile.draw_bounds.intersection(&bounds) else {
            continue;
        };

        let x0 = visible.left.floor().max(0.0) as u32;
        let y0 = visible.top.floor().max(0.0) as u32;
        let x1 = (visible.right.ceil() as u32).min(canvas.width);
        let y1 = (visible.bottom.ceil() as u32).min(canvas.height);
        if x1 <= x0 || y1 <= y0 {
            continue;
        }

        let pixels = bitmap.image();
        let scale_x = pixels.width() as f32 / tile.draw_bounds.width();
        let scale_y = pixels.height() as f32 / tile.draw_bounds.height();
        let (src_x, src_w) = source_span(
            x0 as f32 - tile.draw_bounds.left,
            (x1 - x0) as f32,
            scale_x,
            pixels.width(),
        );
        let (src_y, src_h) = source_span(
            y0 as f32 - tile.draw_bounds.top,
            (y1 - y0) as f32,
            scale_y,
            pixels.height(),
        );
        if src_w == 0 || src_h == 0 {
            continue;
        }

        let view = imageops::crop_imm(pixels, src_x, src_y, src_w, src_h);
        let scaled = imageops::resize(&*view, x1 - x0, y1 - y0, FilterType::Triangle);
        imageops::overlay(&mut target, &scaled, x0 as i64, y0 as i64);
    }

    target
}

/// Bitmap pixel range backing a canvas span starting `offset` pixels into the
/// tile, clamped to the bitmap.
fn source_span(offset: f32, len: f32, scale: f32, limit: u32) -> (u32, u32) {
    if !scale.is_finite() || limit == 0 {
        return (0, 0);
    }
    let start = ((offset * scale).floor().max(0.0) as u32).min(limit - 1);
    let len = ((len * scale).round() as u32).clamp(1, limit - start);
    (start, len)
}

// =============================================================================
// Tests
// =============================================================================
