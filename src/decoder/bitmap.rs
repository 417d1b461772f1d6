use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// Pixel buffer produced by decoding one region.
///
/// Clones share the same buffer. Equality is identity of that buffer, so two
/// draw lists compare equal only when they reference the very same decode.
#[derive(Clone)]
pub struct DecodedBitmap {
    pixels: Arc<RgbaImage>,
}

impl DecodedBitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Bytes held by the pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl From<RgbaImage> for DecodedBitmap {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels)
    }
}

impl PartialEq for DecodedBitmap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl Eq for DecodedBitmap {}

impl fmt::Debug for DecodedBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("ptr", &Arc::as_ptr(&self.pixels))
            .finish()
    }
}
