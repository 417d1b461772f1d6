use std::fmt;

use serde::Serialize;

use super::SampleSize;
use crate::geometry::Rect;

/// Identity of one decodable tile: an image-space rectangle at a sample size.
///
/// Two tiles with equal bounds and sample size share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegionTile {
    /// Bounds in unscaled image pixels
    pub bounds: Rect,

    /// Downsample factor applied when decoding
    pub sample_size: SampleSize,
}

impl RegionTile {
    pub fn new(bounds: Rect, sample_size: SampleSize) -> Self {
        Self {
            bounds,
            sample_size,
        }
    }
}

impl fmt::Display for RegionTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {} @ {}", self.bounds, self.sample_size)
    }
}
