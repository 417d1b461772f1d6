//! Tile grid generation.
//!
//! A [`TileGrid`] is a two-level hierarchy over the source image:
//!
//! - one **base tile** covering the whole image at a coarse sample size, decoded
//!   first and kept as the fallback that hides gaps, and
//! - for every sample size finer than the base, a set of **foreground tiles**
//!   that partition the image edge-to-edge.
//!
//! Every level is generated eagerly. Sample sizes change on nearly every frame
//! of a zoom gesture, so looking a level up must be a map lookup.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{RegionTile, SampleSize};
use crate::config::DEFAULT_MAX_BASE_TILE_PIXELS;
use crate::error::TileError;
use crate::geometry::{Rect, Size};

/// Tile hierarchy for one image and one canvas size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileGrid {
    base: RegionTile,
    foreground: BTreeMap<SampleSize, Vec<RegionTile>>,
}

impl TileGrid {
    /// Build the grid with the default base tile memory ceiling.
    pub fn generate(canvas: Size, image: Size) -> Result<Self, TileError> {
        Self::generate_with_ceiling(canvas, image, DEFAULT_MAX_BASE_TILE_PIXELS)
    }

    /// Build the grid for `image` shown on a canvas of size `canvas`.
    ///
    /// The base tile uses the smallest power-of-two sample size at or above
    /// `max(image) / min(canvas)`, doubled further until the decoded base holds
    /// at most `max_base_pixels` pixels. Foreground tiles at sample size `s`
    /// are `canvas * s` image pixels wide and tall; the last row and column are
    /// clipped to the image bounds.
    ///
    /// Degenerate canvas dimensions are treated as one pixel.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::InvalidImageSize`] if either image dimension is zero.
    pub fn generate_with_ceiling(
        canvas: Size,
        image: Size,
        max_base_pixels: u64,
    ) -> Result<Self, TileError> {
        if image.is_degenerate() {
            return Err(TileError::InvalidImageSize {
                width: image.width,
                height: image.height,
            });
        }

        let canvas = Size::new(canvas.width.max(1), canvas.height.max(1));
        let base_sample = base_sample_size(canvas, image, max_base_pixels);
        let base = RegionTile::new(Rect::from_size(image), base_sample);

        let mut foreground = BTreeMap::new();
        let mut sample = SampleSize::FULL;
        while sample < base_sample {
            foreground.insert(sample, partition(canvas, image, sample));
            sample = sample.coarser();
        }

        Ok(Self { base, foreground })
    }

    /// The whole-image fallback tile.
    pub fn base(&self) -> RegionTile {
        self.base
    }

    /// Foreground tiles for `sample_size`, empty when the grid has no level
    /// that fine or the sample size is at least as coarse as the base.
    pub fn foreground(&self, sample_size: SampleSize) -> &[RegionTile] {
        self.foreground
            .get(&sample_size)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sample sizes with a foreground level, finest first.
    pub fn sample_sizes(&self) -> impl Iterator<Item = SampleSize> + '_ {
        self.foreground.keys().copied()
    }

    /// Total number of foreground tiles over all levels.
    pub fn foreground_len(&self) -> usize {
        self.foreground.values().map(Vec::len).sum()
    }
}

fn base_sample_size(canvas: Size, image: Size, max_base_pixels: u64) -> SampleSize {
    let ratio = image.max_dimension() as f64 / canvas.min_dimension() as f64;
    let mut sample = SampleSize::at_least(ratio);
    while sample < SampleSize::MAX
        && sample.scaled(image.width) as u64 * sample.scaled(image.height) as u64
            > max_base_pixels.max(1)
    {
        sample = sample.coarser();
    }
    sample
}

fn partition(canvas: Size, image: Size, sample: SampleSize) -> Vec<RegionTile> {
    let step_x = canvas.width.saturating_mul(sample.get());
    let step_y = canvas.height.saturating_mul(sample.get());

    let mut tiles = Vec::new();
    let mut top = 0;
    while top < image.height {
        let bottom = top.saturating_add(step_y).min(image.height);
        let mut left = 0;
        while left < image.width {
            let right = left.saturating_add(step_x).min(image.width);
            tiles.push(RegionTile::new(Rect::new(left, top, right, bottom), sample));
            left = right;
        }
        top = bottom;
    }
    tiles
}

// =============================================================================
// Tests
// =============================================================================
