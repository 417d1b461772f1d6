//! Region decoder handle contract.
//!
//! The engine never decodes a full-resolution image. Instead it asks a
//! [`RegionDecoder`] for individual rectangles at a power-of-two downsample
//! factor. Handles are produced by a [`DecoderSource`], which resolves an
//! opaque source identifier (a path, an asset name, ...) into an open handle.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileCache                  │
//! └────────────────────┬────────────────────┘
//!                      │ decode_region(rect, sample_size)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          RegionDecoder Trait            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  ImageRegionDecoder (image crate)       │
//! └─────────────────────────────────────────┘
//! ```

mod bitmap;
mod image_decoder;
mod source;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DecoderError;
use crate::geometry::{Rect, Size};
use crate::tile::SampleSize;

pub use bitmap::DecodedBitmap;
pub use image_decoder::ImageRegionDecoder;
pub use source::{FileSource, MemorySource};

// =============================================================================
// Image metadata
// =============================================================================

/// Orientation the decoded pixels must be rotated by when displayed.
///
/// Extracting this from file metadata is left to decoder implementations; the
/// engine only carries it through to the draw list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Orientation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Properties of an opened image, fixed for the lifetime of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Full-resolution image size
    pub size: Size,
    pub orientation: Orientation,
}

// =============================================================================
// RegionDecoder Trait
// =============================================================================

/// An open, seekable image that can decode arbitrary rectangles.
///
/// Decoding is CPU-bound and synchronous; callers run it on a blocking thread.
/// Implementations must be safe to call concurrently for distinct regions.
pub trait RegionDecoder: Send + Sync {
    /// Size and orientation of the unscaled image.
    fn info(&self) -> ImageInfo;

    /// Decode `rect` (image space) downsampled by `sample_size`.
    ///
    /// The returned bitmap is roughly `rect.width() / sample_size` by
    /// `rect.height() / sample_size` pixels.
    fn decode_region(&self, rect: Rect, sample_size: SampleSize)
        -> Result<DecodedBitmap, DecoderError>;

    /// Release the handle. Only the first call has an effect; any decode issued
    /// afterwards fails with [`DecoderError::Closed`].
    fn close(&self);
}

// =============================================================================
// DecoderSource Trait
// =============================================================================

/// Resolves source identifiers into open decoder handles.
///
/// This abstraction keeps the pipeline independent of where image bytes come
/// from (local files, bundled assets, a network-backed disk cache, ...).
#[async_trait]
pub trait DecoderSource: Send + Sync {
    /// Open a decoder handle for the given source identifier.
    async fn open(&self, source_id: &str) -> Result<Arc<dyn RegionDecoder>, DecoderError>;
}
