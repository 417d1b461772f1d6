//! Rendering pipeline.
//!
//! Turns a live canvas size and render transform into an ordered draw list,
//! keeping the tile cache's required set in step with what is on screen.
//!
//! ```text
//!  canvas size ──┐
//!  transform ────┼──► Driver ──► compute_frame ──► draw list (watch)
//!  bitmaps ──────┘       │              │
//!       ▲                │ new canvas   │ required set
//!       │                ▼              ▼
//!       │           TileGrid ┌──────────────────┐
//!       └────────────────────│    TileCache     │
//!                            └──────────────────┘
//! ```
//!
//! The pipeline moves through [`PipelineState::AwaitingCanvasSize`],
//! [`PipelineState::AwaitingGrid`] and [`PipelineState::Streaming`]; a canvas
//! change while streaming rebuilds the grid and invalidates in-flight decodes.
//! [`PipelineState::Disposed`] is terminal.

mod driver;
mod frame;

pub use driver::{DrawList, PipelineHandle, PipelineState, SubSamplingPipeline};
pub use frame::{compute_frame, is_complete, CanvasRegionTile, Frame, FrameInputs};
