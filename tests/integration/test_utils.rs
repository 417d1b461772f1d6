//! Test utilities for integration tests.
//!
//! This module provides mock decoders, sources and reporters, plus helpers for
//! waiting on pipeline output.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use tilescope::{
    DecodedBitmap, DecoderError, DecoderSource, DrawList, ErrorReporter, ImageInfo, Orientation,
    PipelineState, Rect, RegionDecoder, RegionTile, SampleSize, Size, TileError,
};

/// Upper bound for any wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock Decoder with Call Tracking
// =============================================================================

/// A decoder that counts calls per tile and can hold decodes until released.
///
/// Bitmaps are solid and sized `ceil(w / s) x ceil(h / s)`.
pub struct MockDecoder {
    size: Size,
    orientation: Orientation,
    calls: Mutex<HashMap<RegionTile, usize>>,
    order: Mutex<Vec<RegionTile>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    running_per_tile: Mutex<HashMap<RegionTile, usize>>,
    max_per_tile: AtomicUsize,
    gate_open: Mutex<bool>,
    gate: Condvar,
    fail_rects: Mutex<Vec<Rect>>,
    closed: AtomicBool,
}

impl MockDecoder {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Self::build(width, height, true)
    }

    /// Decoder whose decodes block until [`MockDecoder::release`] is called.
    pub fn gated(width: u32, height: u32) -> Arc<Self> {
        Self::build(width, height, false)
    }

    fn build(width: u32, height: u32, open: bool) -> Arc<Self> {
        Arc::new(Self {
            size: Size::new(width, height),
            orientation: Orientation::Normal,
            calls: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            running_per_tile: Mutex::new(HashMap::new()),
            max_per_tile: AtomicUsize::new(0),
            gate_open: Mutex::new(open),
            gate: Condvar::new(),
            fail_rects: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Fail the next decode of `rect`.
    pub fn fail_once(&self, rect: Rect) {
        self.fail_rects.lock().unwrap().push(rect);
    }

    /// Let blocked and future decodes run.
    pub fn release(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    pub fn calls(&self, tile: &RegionTile) -> usize {
        self.calls.lock().unwrap().get(tile).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Tiles decoded so far, with their call counts.
    pub fn decoded_tiles(&self) -> HashMap<RegionTile, usize> {
        self.calls.lock().unwrap().clone()
    }

    /// Tiles in the order their decodes started.
    pub fn call_order(&self) -> Vec<RegionTile> {
        self.order.lock().unwrap().clone()
    }

    /// Highest number of decodes observed running at once.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Highest number of decodes of one tile observed running at once.
    pub fn max_running_per_tile(&self) -> usize {
        self.max_per_tile.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RegionDecoder for MockDecoder {
    fn info(&self) -> ImageInfo {
        ImageInfo {
            size: self.size,
            orientation: self.orientation,
        }
    }

    fn decode_region(&self, rect: Rect, sample_size: SampleSize) -> Result<DecodedBitmap, DecoderError> {
        if self.is_closed() {
            return Err(DecoderError::Closed);
        }
        let tile = RegionTile::new(rect, sample_size);
        *self.calls.lock().unwrap().entry(tile).or_default() += 1;
        self.order.lock().unwrap().push(tile);

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        {
            let mut per_tile = self.running_per_tile.lock().unwrap();
            let count = per_tile.entry(tile).or_default();
            *count += 1;
            self.max_per_tile.fetch_max(*count, Ordering::SeqCst);
        }

        {
            let mut open = self.gate_open.lock().unwrap();
            while !*open {
                let (guard, timeout) = self.gate.wait_timeout(open, TEST_TIMEOUT).unwrap();
                open = guard;
                if timeout.timed_out() {
                    break;
                }
            }
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.running_per_tile.lock().unwrap().get_mut(&tile) {
            *count -= 1;
        }

        {
            let mut failing = self.fail_rects.lock().unwrap();
            if let Some(index) = failing.iter().position(|r| *r == rect) {
                failing.remove(index);
                return Err(DecoderError::Decode(format!("corrupt data in {}", rect)));
            }
        }

        let width = sample_size.scaled(rect.width()).max(1);
        let height = sample_size.scaled(rect.height()).max(1);
        Ok(DecodedBitmap::new(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 100, 50, 255]),
        )))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Mock Sources
// =============================================================================

/// A source that hands out a fixed decoder, or fails to open.
pub struct MockSource {
    decoder: Option<Arc<MockDecoder>>,
    opens: AtomicUsize,
}

impl MockSource {
    pub fn new(decoder: Arc<MockDecoder>) -> Self {
        Self {
            decoder: Some(decoder),
            opens: AtomicUsize::new(0),
        }
    }

    /// A source whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            decoder: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecoderSource for MockSource {
    async fn open(&self, source_id: &str) -> Result<Arc<dyn RegionDecoder>, DecoderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.decoder {
            Some(decoder) => Ok(decoder.clone()),
            None => Err(DecoderError::Open(format!("{}: unreadable header", source_id))),
        }
    }
}

// =============================================================================
// Collecting Reporter
// =============================================================================

/// Records every reported error with its source identifier.
#[derive(Default)]
pub struct CollectingReporter {
    errors: Mutex<Vec<(TileError, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<(TileError, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &TileError, source_id: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((error.clone(), source_id.to_string()));
    }
}

// =============================================================================
// Waiting Helpers
// =============================================================================

/// Wait until the draw list satisfies `predicate` and return it.
pub async fn wait_for_frame(
    frames: &mut watch::Receiver<DrawList>,
    predicate: impl FnMut(&DrawList) -> bool,
) -> DrawList {
    let frame = tokio::time::timeout(TEST_TIMEOUT, frames.wait_for(predicate))
        .await
        .expect("timed out waiting for frame")
        .expect("pipeline stopped");
    frame.clone()
}

/// Wait until the pipeline reaches `wanted`.
pub async fn wait_for_state(states: &mut watch::Receiver<PipelineState>, wanted: PipelineState) {
    tokio::time::timeout(TEST_TIMEOUT, states.wait_for(|s| *s == wanted))
        .await
        .expect("timed out waiting for pipeline state")
        .expect("pipeline state channel closed");
}
