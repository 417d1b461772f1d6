//! Tiling layer.
//!
//! This module decides which parts of the image exist as decodable tiles and
//! keeps the decoded ones in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Rendering Pipeline           │
//! └──────────┬─────────────────┬────────────┘
//!            │ sample size     │ required set
//!            ▼                 ▼
//! ┌────────────────────┐ ┌──────────────────┐
//! │ select_sample_size │ │    TileCache     │
//! │ TileGrid           │ │ (decode, evict,  │
//! │ (base + levels)    │ │  publish)        │
//! └────────────────────┘ └────────┬─────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────┐
//! │             RegionDecoder               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`SampleSize`] and [`select_sample_size`]: zoom scale to downsample factor
//! - [`RegionTile`]: cache identity of a tile (bounds + sample size)
//! - [`TileGrid`]: base tile plus per-sample-size foreground partitions
//! - [`TileCache`]: required-set driven decode cache with a pinned base tile
//!
//! # Example
//!
//! ```
//! use tilescope::geometry::Size;
//! use tilescope::tile::{select_sample_size, TileGrid};
//!
//! let grid = TileGrid::generate(Size::new(1000, 1000), Size::new(4000, 3000)).unwrap();
//! assert_eq!(grid.base().sample_size.get(), 4);
//!
//! // Zoomed in to one image pixel per canvas pixel.
//! let sample = select_sample_size(1.0);
//! assert_eq!(grid.foreground(sample).len(), 12);
//! ```

mod cache;
mod grid;
mod region;
mod sample_size;

pub use cache::{BitmapSnapshot, RequiredSet, TileCache};
pub use grid::TileGrid;
pub use region::RegionTile;
pub use sample_size::{select_sample_size, SampleSize, MAX_SAMPLE_SIZE};
