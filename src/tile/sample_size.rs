//! Sample sizes and the zoom-to-sample-size policy.

use std::fmt;

use serde::Serialize;

/// Coarsest sample size the engine will ever use.
pub const MAX_SAMPLE_SIZE: u32 = 1 << 30;

/// Power-of-two downsample factor applied when decoding a region.
///
/// `1` decodes at full resolution, `2` at half resolution, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SampleSize(u32);

impl SampleSize {
    /// Full resolution.
    pub const FULL: SampleSize = SampleSize(1);

    /// Coarsest representable sample size.
    pub const MAX: SampleSize = SampleSize(MAX_SAMPLE_SIZE);

    /// Returns `None` unless `value` is a power of two no larger than
    /// [`MAX_SAMPLE_SIZE`].
    pub fn new(value: u32) -> Option<Self> {
        (value.is_power_of_two() && value <= MAX_SAMPLE_SIZE).then_some(Self(value))
    }

    /// Smallest sample size that is at least `ratio`.
    pub fn at_least(ratio: f64) -> Self {
        let mut sample = Self::FULL;
        while (sample.0 as f64) < ratio && sample < Self::MAX {
            sample = sample.coarser();
        }
        sample
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Next coarser sample size, saturating at [`SampleSize::MAX`].
    pub fn coarser(&self) -> Self {
        Self((self.0 * 2).min(MAX_SAMPLE_SIZE))
    }

    /// Size of `length` image pixels once decoded at this sample size.
    pub fn scaled(&self, length: u32) -> u32 {
        length.div_ceil(self.0)
    }
}

impl fmt::Display for SampleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "1/{}", self.0)
    }
}

/// Pick the sample size for the current zoom.
///
/// `max_scale` is the larger axis scale of the render transform (canvas pixels
/// per image pixel). The result is the largest power of two `s` with
/// `s <= 1 / max_scale`, so one decoded pixel never covers more than one canvas
/// pixel. The threshold is inclusive: at exactly `max_scale == 1 / s` the
/// selector returns `s`, and anything above it returns `s / 2`.
///
/// Scales at or above `1.0` select full resolution. Non-positive and NaN
/// scales select [`SampleSize::MAX`].
pub fn select_sample_size(max_scale: f32) -> SampleSize {
    if max_scale.is_nan() || max_scale <= 0.0 {
        return SampleSize::MAX;
    }

    let ratio = 1.0 / max_scale as f64;
    let mut sample = SampleSize::FULL;
    while sample < SampleSize::MAX && (sample.0 as f64 * 2.0) <= ratio {
        sample = sample.coarser();
    }
    sample
}

// =============================================================================
// Tests
// =============================================================================
