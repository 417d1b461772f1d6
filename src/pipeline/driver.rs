//! Reactive pipeline driver.
//!
//! One task per image source. It watches the canvas size, the transform and
//! the cache snapshot, and after every change recomputes the frame from the
//! latest value of all three.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::frame::{compute_frame, CanvasRegionTile, FrameInputs};
use crate::config::EngineConfig;
use crate::decoder::{DecodedBitmap, DecoderSource, ImageInfo, RegionDecoder};
use crate::error::TileError;
use crate::geometry::{RenderTransform, Size};
use crate::reporter::ErrorReporter;
use crate::tile::{BitmapSnapshot, TileCache, TileGrid};

/// Ordered tiles to draw, replaced wholesale on every emission.
pub type DrawList = Arc<Vec<CanvasRegionTile>>;

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No non-degenerate canvas size seen yet
    AwaitingCanvasSize,
    /// Canvas known, grid being built
    AwaitingGrid,
    /// Grid built, frames being emitted
    Streaming,
    /// Torn down; terminal
    Disposed,
}

// =============================================================================
// SubSamplingPipeline
// =============================================================================

/// Rendering pipeline for one opened image.
pub struct SubSamplingPipeline {
    decoder: Arc<dyn RegionDecoder>,
    source_id: Arc<str>,
    reporter: Arc<dyn ErrorReporter>,
    config: EngineConfig,
    preview: Option<DecodedBitmap>,
}

impl SubSamplingPipeline {
    /// Open `source_id` through `source` and build a pipeline around it.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::DecoderOpen`] if the handle cannot be opened. The
    /// failure is also passed to `reporter`.
    pub async fn open<S>(
        source: &S,
        source_id: &str,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, TileError>
    where
        S: DecoderSource + ?Sized,
    {
        match source.open(source_id).await {
            Ok(decoder) => Ok(Self::new(decoder, source_id, reporter)),
            Err(e) => {
                let error = TileError::DecoderOpen(e);
                reporter.report(&error, source_id);
                Err(error)
            }
        }
    }

    pub fn new(
        decoder: Arc<dyn RegionDecoder>,
        source_id: impl Into<Arc<str>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            decoder,
            source_id: source_id.into(),
            reporter,
            config: EngineConfig::default(),
            preview: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Show `preview` in place of the base tile until the base tile decodes.
    pub fn with_preview(mut self, preview: DecodedBitmap) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn image_info(&self) -> ImageInfo {
        self.decoder.info()
    }

    /// Start the driver task.
    ///
    /// The pipeline runs until [`PipelineHandle::dispose`] is called, the
    /// handle is dropped, or both input senders are dropped.
    pub fn spawn(
        self,
        canvas: watch::Receiver<Size>,
        transform: watch::Receiver<RenderTransform>,
    ) -> PipelineHandle {
        let cache = TileCache::with_concurrency(
            Arc::clone(&self.decoder),
            Arc::clone(&self.source_id),
            Arc::clone(&self.reporter),
            self.config.max_concurrent_decodes,
        );
        let (frames_tx, frames) = watch::channel(DrawList::default());
        let (state_tx, state) = watch::channel(PipelineState::AwaitingCanvasSize);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            bitmaps: cache.current_bitmaps(),
            cache: cache.clone(),
            pipeline: self,
            canvas,
            transform,
            frames: frames_tx,
            state: state_tx,
            grid: None,
        };
        let task = tokio::spawn(driver.run(shutdown_rx));

        PipelineHandle {
            frames,
            state,
            cache,
            shutdown: Some(shutdown),
            task,
        }
    }
}

// =============================================================================
// PipelineHandle
// =============================================================================

/// Handle to a running pipeline. Dropping it shuts the pipeline down.
pub struct PipelineHandle {
    frames: watch::Receiver<DrawList>,
    state: watch::Receiver<PipelineState>,
    cache: TileCache,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), TileError>>,
}

impl PipelineHandle {
    /// Observe emitted draw lists.
    pub fn frames(&self) -> watch::Receiver<DrawList> {
        self.frames.clone()
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Stop the pipeline and wait for teardown.
    ///
    /// Returns the error that ended the pipeline early, if any.
    pub async fn dispose(mut self) -> Result<(), TileError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TileError::Disposed),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

struct Driver {
    pipeline: SubSamplingPipeline,
    cache: TileCache,
    canvas: watch::Receiver<Size>,
    transform: watch::Receiver<RenderTransform>,
    bitmaps: watch::Receiver<BitmapSnapshot>,
    frames: watch::Sender<DrawList>,
    state: watch::Sender<PipelineState>,
    /// Grid and the canvas size it was built for
    grid: Option<(Size, TileGrid)>,
}

impl Driver {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), TileError> {
        let source_id = Arc::clone(&self.pipeline.source_id);
        info!(source_id = %source_id, "Pipeline started");

        let mut canvas_open = true;
        let mut transform_open = true;

        let result = loop {
            if let Err(e) = self.step().await {
                break Err(e);
            }

            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                changed = self.canvas.changed(), if canvas_open => {
                    canvas_open = changed.is_ok();
                }
                changed = self.transform.changed(), if transform_open => {
                    transform_open = changed.is_ok();
                }
                changed = self.bitmaps.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }

            if !canvas_open && !transform_open {
                debug!(source_id = %source_id, "Pipeline inputs closed");
                break Ok(());
            }
        };

        self.teardown().await;
        info!(source_id = %source_id, "Pipeline disposed");
        result
    }

    /// Recompute from the latest inputs and emit if the draw list changed.
    async fn step(&mut self) -> Result<(), TileError> {
        let canvas = *self.canvas.borrow_and_update();
        let transform = *self.transform.borrow_and_update();
        let bitmaps = self.bitmaps.borrow_and_update().clone();

        if canvas.is_degenerate() {
            return Ok(());
        }
        if self.grid.as_ref().map(|(size, _)| *size) != Some(canvas) {
            self.rebuild_grid(canvas).await?;
        }
        let Some((_, grid)) = &self.grid else {
            return Ok(());
        };

        let frame = compute_frame(&FrameInputs {
            grid,
            canvas,
            transform: &transform,
            bitmaps: &bitmaps,
            preview: self.pipeline.preview.as_ref(),
            orientation: self.pipeline.decoder.info().orientation,
        });
        self.cache.update_required_set(frame.required).await;

        let tiles = frame.tiles;
        self.frames.send_if_modified(|current| {
            if current.as_slice() == tiles.as_slice() {
                return false;
            }
            *current = Arc::new(tiles);
            true
        });
        Ok(())
    }

    async fn rebuild_grid(&mut self, canvas: Size) -> Result<(), TileError> {
        self.state.send_replace(PipelineState::AwaitingGrid);
        if self.grid.take().is_some() {
            self.cache.invalidate().await;
        }

        let image = self.pipeline.decoder.info().size;
        let grid = TileGrid::generate_with_ceiling(
            canvas,
            image,
            self.pipeline.config.max_base_tile_pixels,
        )
        .map_err(|e| {
            self.pipeline.reporter.report(&e, &self.pipeline.source_id);
            e
        })?;

        debug!(
            source_id = %self.pipeline.source_id,
            %canvas,
            %image,
            base = %grid.base(),
            foreground = grid.foreground_len(),
            "Built tile grid"
        );
        self.grid = Some((canvas, grid));
        self.state.send_replace(PipelineState::Streaming);
        Ok(())
    }

    async fn teardown(&mut self) {
        self.cache.dispose().await;
        self.pipeline.decoder.close();
        self.grid = None;
        self.frames.send_replace(DrawList::default());
        self.state.send_replace(PipelineState::Disposed);
    }
}

// =============================================================================
// Tests
// =============================================================================
