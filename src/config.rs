//! Configuration for the engine and the `tilescope` CLI.
//!
//! The library is configured through [`EngineConfig`]. The binary parses its
//! arguments with clap; every option can also be set through an environment
//! variable with the `TILESCOPE_` prefix:
//!
//! - `TILESCOPE_CANVAS` - Canvas size as `WIDTHxHEIGHT` (default: 1000x1000)
//! - `TILESCOPE_ZOOM` - Zoom relative to the fitted image (default: 1.0)
//! - `TILESCOPE_MAX_DECODES` - Concurrent region decodes (default: 4)
//! - `TILESCOPE_MAX_BASE_PIXELS` - Base tile pixel ceiling (default: 4096*4096)
//! - `TILESCOPE_TIMEOUT_MS` - Render timeout in milliseconds (default: 10000)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::geometry::Size;

// =============================================================================
// Default Values
// =============================================================================

/// Default number of region decodes running at once.
pub const DEFAULT_MAX_CONCURRENT_DECODES: usize = 4;

/// Default pixel ceiling of the decoded base tile (64 MiB of RGBA).
pub const DEFAULT_MAX_BASE_TILE_PIXELS: u64 = 4096 * 4096;

/// Default time the CLI waits for a gap-free frame.
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 10_000;

/// Default canvas size used by the CLI.
pub const DEFAULT_CANVAS: &str = "1000x1000";

// =============================================================================
// Engine Configuration
// =============================================================================

/// Tuning knobs for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of region decodes running at the same time
    pub max_concurrent_decodes: usize,

    /// Upper bound on the decoded base tile, in pixels
    pub max_base_tile_pixels: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_decodes: DEFAULT_MAX_CONCURRENT_DECODES,
            max_base_tile_pixels: DEFAULT_MAX_BASE_TILE_PIXELS,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_decodes == 0 {
            return Err("max_concurrent_decodes must be greater than 0".to_string());
        }
        if self.max_base_tile_pixels == 0 {
            return Err("max_base_tile_pixels must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tilescope - progressive, region-tiled rendering of very large images.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilescope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render a viewport of an image to a PNG through the tiling pipeline.
    Render(RenderConfig),

    /// Print the tile grid for an image and canvas size.
    Grid(GridConfig),
}

/// Arguments of `tilescope render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Image file to open.
    pub input: PathBuf,

    /// Output PNG path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Canvas size as WIDTHxHEIGHT.
    #[arg(long, default_value = DEFAULT_CANVAS, value_parser = parse_size, env = "TILESCOPE_CANVAS")]
    pub canvas: Size,

    /// Zoom factor relative to the image fitted into the canvas.
    #[arg(long, default_value_t = 1.0, env = "TILESCOPE_ZOOM")]
    pub zoom: f32,

    /// Horizontal zoom focus, as a fraction of the canvas width.
    #[arg(long, default_value_t = 0.5)]
    pub focus_x: f32,

    /// Vertical zoom focus, as a fraction of the canvas height.
    #[arg(long, default_value_t = 0.5)]
    pub focus_y: f32,

    /// Maximum number of concurrent region decodes.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_DECODES, env = "TILESCOPE_MAX_DECODES")]
    pub max_decodes: usize,

    /// Pixel ceiling of the low-resolution base tile.
    #[arg(long, default_value_t = DEFAULT_MAX_BASE_TILE_PIXELS, env = "TILESCOPE_MAX_BASE_PIXELS")]
    pub max_base_pixels: u64,

    /// How long to wait for every visible tile to decode, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_RENDER_TIMEOUT_MS, env = "TILESCOPE_TIMEOUT_MS")]
    pub timeout_ms: u64,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.canvas.is_degenerate() {
            return Err("canvas must have a non-zero width and height".to_string());
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err("zoom must be a positive number".to_string());
        }
        if !(0.0..=1.0).contains(&self.focus_x) || !(0.0..=1.0).contains(&self.focus_y) {
            return Err("focus must be between 0 and 1".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        self.engine_config().validate()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent_decodes: self.max_decodes,
            max_base_tile_pixels: self.max_base_pixels,
        }
    }
}

/// Output format for `tilescope grid`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GridOutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Full grid as JSON
    Json,
}

/// Arguments of `tilescope grid`.
#[derive(Args, Debug, Clone)]
pub struct GridConfig {
    /// Image size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_size)]
    pub image: Size,

    /// Canvas size as WIDTHxHEIGHT.
    #[arg(long, default_value = DEFAULT_CANVAS, value_parser = parse_size, env = "TILESCOPE_CANVAS")]
    pub canvas: Size,

    /// Pixel ceiling of the low-resolution base tile.
    #[arg(long, default_value_t = DEFAULT_MAX_BASE_TILE_PIXELS, env = "TILESCOPE_MAX_BASE_PIXELS")]
    pub max_base_pixels: u64,

    /// Output format.
    #[arg(long, value_enum, default_value_t = GridOutputFormat::Text)]
    pub format: GridOutputFormat,
}

impl GridConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.canvas.is_degenerate() {
            return Err("canvas must have a non-zero width and height".to_string());
        }
        if self.max_base_pixels == 0 {
            return Err("max_base_pixels must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;

    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width '{}': {}", width, e))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid height '{}': {}", height, e))?;

    Ok(Size::new(width, height))
}

// =============================================================================
// Tests
// =============================================================================
