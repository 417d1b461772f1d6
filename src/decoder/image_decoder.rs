//! Region decoder backed by the `image` crate.
//!
//! The `image` crate has no partial decode for most codecs, so this backend
//! decodes the source once into an RGBA buffer and serves regions from it.
//! It is the reference implementation of the handle contract and what the CLI
//! uses; platform region decoders plug in through the same trait.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use tracing::debug;

use super::{DecodedBitmap, ImageInfo, Orientation, RegionDecoder};
use crate::error::DecoderError;
use crate::geometry::{Rect, Size};
use crate::tile::SampleSize;

/// In-memory region decoder for any format the `image` crate can read.
pub struct ImageRegionDecoder {
    info: ImageInfo,
    pixels: RwLock<Option<Arc<RgbaImage>>>,
    closed: AtomicBool,
}

impl ImageRegionDecoder {
    /// Decode encoded image bytes, guessing the format from its header.
    pub fn from_encoded(data: &[u8]) -> Result<Self, DecoderError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| DecoderError::Open(format!("Failed to detect format: {}", e)))?;

        let image = reader
            .decode()
            .map_err(|e| DecoderError::Open(format!("Failed to decode image: {}", e)))?;

        Ok(Self::from_rgba(image.to_rgba8()))
    }

    /// Wrap an already decoded RGBA buffer.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        let size = Size::new(pixels.width(), pixels.height());
        Self {
            info: ImageInfo {
                size,
                orientation: Orientation::Normal,
            },
            pixels: RwLock::new(Some(Arc::new(pixels))),
            closed: AtomicBool::new(false),
        }
    }

    /// Report a different orientation for the decoded pixels.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.info.orientation = orientation;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn pixels(&self) -> Result<Arc<RgbaImage>, DecoderError> {
        let guard = self.pixels.read().map_err(|_| DecoderError::Closed)?;
        guard.clone().ok_or(DecoderError::Closed)
    }
}

impl RegionDecoder for ImageRegionDecoder {
    fn info(&self) -> ImageInfo {
        self.info
    }

    fn decode_region(
        &self,
        rect: Rect,
        sample_size: SampleSize,
    ) -> Result<DecodedBitmap, DecoderError> {
        let pixels = self.pixels()?;

        let size = self.info.size;
        if rect.is_empty() || !Rect::from_size(size).contains_rect(&rect) {
            return Err(DecoderError::InvalidRegion {
                rect,
                width: size.width,
                height: size.height,
            });
        }

        let view = imageops::crop_imm(
            pixels.as_ref(),
            rect.left,
            rect.top,
            rect.width(),
            rect.height(),
        );

        let sample = sample_size.get();
        if sample == 1 {
            return Ok(DecodedBitmap::new(view.to_image()));
        }

        let width = rect.width().div_ceil(sample);
        let height = rect.height().div_ceil(sample);
        Ok(DecodedBitmap::new(imageops::resize(
            &*view,
            width,
            height,
            FilterType::Triangle,
        )))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut guard) = self.pixels.write() {
            guard.take();
        }
        debug!(size = %self.info.size, "Closed image region decoder");
    }
}

// =============================================================================
// Tests
// =============================================================================
