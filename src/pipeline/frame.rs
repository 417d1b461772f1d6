//! Per-frame tile selection.
//!
//! [`compute_frame`] is a pure function of the grid, canvas size, transform
//! and the current bitmap snapshot. The driver calls it inline on every input
//! change, so it only does culling and sorting over one grid level.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::decoder::{DecodedBitmap, Orientation};
use crate::geometry::{CanvasRect, Point, RenderTransform, Size};
use crate::tile::{select_sample_size, RegionTile, RequiredSet, SampleSize, TileGrid};

/// A tile positioned on the canvas, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasRegionTile {
    pub tile: RegionTile,

    /// Where the tile lands on the canvas
    pub draw_bounds: CanvasRect,

    /// Decoded pixels, or `None` while the tile is still decoding
    pub bitmap: Option<DecodedBitmap>,

    /// Whether this is the low-resolution base tile
    pub is_base: bool,

    pub orientation: Orientation,
}

/// Everything needed to compute one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub grid: &'a TileGrid,
    pub canvas: Size,
    pub transform: &'a RenderTransform,
    pub bitmaps: &'a HashMap<RegionTile, DecodedBitmap>,

    /// Stand-in for the base tile until its own decode lands
    pub preview: Option<&'a DecodedBitmap>,
    pub orientation: Orientation,
}

/// Result of one recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Sample size picked for the transform
    pub sample_size: SampleSize,

    /// Draw list: base tile first when shown, then foreground tiles
    pub tiles: Vec<CanvasRegionTile>,

    /// Tiles the cache must hold for this frame
    pub required: RequiredSet,
}

/// Select, cull, prioritise and resolve the tiles for one frame.
///
/// Foreground tiles come from the grid level matching the transform's sample
/// size. Tiles whose canvas rectangle does not overlap the canvas are dropped
/// from both the draw list and the required set. The remaining tiles are
/// ordered so that those containing the transform centroid come first, then by
/// distance from the centroid.
///
/// The base tile is drawn whenever a visible foreground tile lacks a bitmap or
/// no foreground tile is visible at all. It is always part of the required set.
pub fn compute_frame(inputs: &FrameInputs<'_>) -> Frame {
    let transform = inputs.transform;
    let sample_size = select_sample_size(transform.max_scale());
    let canvas_bounds = CanvasRect::from_size(inputs.canvas);
    let centroid = transform.centroid;

    let mut visible: Vec<(RegionTile, CanvasRect)> = inputs
        .grid
        .foreground(sample_size)
        .iter()
        .map(|tile| (*tile, transform.apply(&tile.bounds)))
        .filter(|(_, bounds)| bounds.intersects(&canvas_bounds))
        .collect();
    visible.sort_by(|(_, a), (_, b)| decode_priority(a, b, centroid));

    let foreground: Vec<CanvasRegionTile> = visible
        .iter()
        .map(|(tile, bounds)| CanvasRegionTile {
            tile: *tile,
            draw_bounds: *bounds,
            bitmap: inputs.bitmaps.get(tile).cloned(),
            is_base: false,
            orientation: inputs.orientation,
        })
        .collect();

    let base = inputs.grid.base();
    let show_base = foreground.is_empty() || foreground.iter().any(|t| t.bitmap.is_none());

    let mut tiles = Vec::with_capacity(foreground.len() + 1);
    if show_base {
        tiles.push(CanvasRegionTile {
            tile: base,
            draw_bounds: transform.apply(&base.bounds),
            bitmap: inputs.bitmaps.get(&base).or(inputs.preview).cloned(),
            is_base: true,
            orientation: inputs.orientation,
        });
    }
    tiles.extend(foreground);

    Frame {
        sample_size,
        tiles,
        required: RequiredSet::new(base, visible.into_iter().map(|(tile, _)| tile).collect()),
    }
}

/// Whether every tile in the draw list has pixels to show.
///
/// A draw list that still shows the base tile next to foreground tiles always
/// has a gap, so it is never complete.
pub fn is_complete(tiles: &[CanvasRegionTile]) -> bool {
    !tiles.is_empty() && tiles.iter().all(|t| t.bitmap.is_some())
}

fn decode_priority(a: &CanvasRect, b: &CanvasRect, centroid: Point) -> Ordering {
    let contains_a = a.contains(centroid);
    let contains_b = b.contains(centroid);
    contains_b
        .cmp(&contains_a)
        .then_with(|| distance_sq(a, centroid).total_cmp(&distance_sq(b, centroid)))
}

fn distance_sq(rect: &CanvasRect, point: Point) -> f32 {
    let center = rect.center();
    let dx = center.x - point.x;
    let dy = center.y - point.y;
    dx * dx + dy * dy
}

// =============================================================================
// Tests
// =============================================================================
