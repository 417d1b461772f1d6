use thiserror::Error;

use crate::geometry::Rect;
use crate::tile::RegionTile;

/// Errors raised by a region decoder handle.
#[derive(Debug, Clone, Error)]
pub enum DecoderError {
    /// The source could not be opened or its header could not be read
    #[error("Failed to open source: {0}")]
    Open(String),

    /// Requested rectangle does not lie within the image
    #[error("Invalid region {rect}: image is {width}x{height}")]
    InvalidRegion { rect: Rect, width: u32, height: u32 },

    /// The codec failed while producing pixels for a region
    #[error("Decode error: {0}")]
    Decode(String),

    /// The handle was closed before or during the call
    #[error("Decoder is closed")]
    Closed,
}

impl DecoderError {
    /// Whether this error only signals that the handle went away.
    ///
    /// Results that fail this way are dropped silently instead of reported.
    pub fn is_closed(&self) -> bool {
        matches!(self, DecoderError::Closed)
    }
}

/// Errors surfaced by the tiling engine.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The decoder reported a non-positive image dimension
    #[error("Invalid image size: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    /// The decoder handle could not be opened
    #[error("Failed to open decoder: {0}")]
    DecoderOpen(DecoderError),

    /// A single tile failed to decode
    #[error("Failed to decode {tile}: {source}")]
    RegionDecode {
        tile: RegionTile,
        #[source]
        source: DecoderError,
    },

    /// The pipeline or cache was torn down
    #[error("Pipeline disposed")]
    Disposed,
}
