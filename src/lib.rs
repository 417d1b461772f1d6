//! # Tilescope
//!
//! Progressive, region-tiled rendering of very large images.
//!
//! A full-resolution bitmap of a 50 megapixel photo does not fit comfortably
//! in memory, and most of it is never on screen at full resolution anyway.
//! This library decodes only the rectangles the current viewport needs, at the
//! coarsest downsample factor that still looks sharp, and keeps a
//! low-resolution base tile underneath to hide gaps while decodes run.
//!
//! ## Features
//!
//! - **Region decoding**: Tiles are decoded on demand through a [`RegionDecoder`] handle
//! - **Power-of-two levels**: Sample sizes follow the zoom scale, finer as you zoom in
//! - **Required-set cache**: Decodes what is needed, releases what is not, one decode per tile
//! - **Gap-free frames**: The pinned base tile backs every incomplete foreground
//! - **Cancellation**: Canvas changes invalidate in-flight decodes by generation
//!
//! ## Architecture
//!
//! - [`decoder`] - Region decoder contract and an `image`-crate backend
//! - [`tile`] - Sample sizes, tile grid and tile cache
//! - [`pipeline`] - Reactive driver turning canvas and transform into draw lists
//! - [`render`] - Reference compositor for draw lists
//! - [`geometry`] - Image and canvas coordinate types
//! - [`config`] - Engine configuration and CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tilescope::{
//!     is_complete, FileSource, RenderTransform, Size, SubSamplingPipeline,
//!     TracingErrorReporter,
//! };
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tilescope::TileError> {
//!     let pipeline =
//!         SubSamplingPipeline::open(&FileSource::new(), "photo.jpg", Arc::new(TracingErrorReporter))
//!             .await?;
//!
//!     let canvas = Size::new(1000, 1000);
//!     let transform = RenderTransform::fit(pipeline.image_info().size, canvas);
//!     let (_canvas_tx, canvas_rx) = watch::channel(canvas);
//!     let (_transform_tx, transform_rx) = watch::channel(transform);
//!
//!     let handle = pipeline.spawn(canvas_rx, transform_rx);
//!     let mut frames = handle.frames();
//!     let _ = frames.wait_for(|tiles| is_complete(tiles)).await;
//!
//!     handle.dispose().await
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod render;
pub mod reporter;
pub mod tile;

// Re-export commonly used types
pub use config::EngineConfig;
pub use decoder::{
    DecodedBitmap, DecoderSource, FileSource, ImageInfo, ImageRegionDecoder, MemorySource,
    Orientation, RegionDecoder,
};
pub use error::{DecoderError, TileError};
pub use geometry::{CanvasRect, Point, Rect, RenderTransform, Size};
pub use pipeline::{
    compute_frame, is_complete, CanvasRegionTile, DrawList, Frame, FrameInputs, PipelineHandle,
    PipelineState, SubSamplingPipeline,
};
pub use render::compose;
pub use reporter::{ErrorReporter, TracingErrorReporter};
pub use tile::{
    select_sample_size, BitmapSnapshot, RegionTile, RequiredSet, SampleSize, TileCache, TileGrid,
};
