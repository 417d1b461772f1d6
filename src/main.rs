//! Tilescope - renders viewports of very large images through the tiling pipeline.
//!
//! `render` opens an image, drives one pipeline until the frame has no gaps,
//! and writes the composited canvas as a PNG. `grid` prints the tile grid for
//! an image and canvas size.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilescope::{
    config::{Cli, Command, GridConfig, GridOutputFormat, RenderConfig},
    is_complete, render, FileSource, Point, RenderTransform, SubSamplingPipeline, TileGrid,
    TracingErrorReporter,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Render(config) => run_render(config).await,
        Command::Grid(config) => run_grid(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilescope=debug"
    } else {
        "tilescope=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source_id = config.input.to_string_lossy().into_owned();
    let pipeline =
        match SubSamplingPipeline::open(&FileSource::new(), &source_id, Arc::new(TracingErrorReporter))
            .await
        {
            Ok(pipeline) => pipeline.with_config(config.engine_config()),
            Err(e) => {
                error!("Failed to open {}: {}", source_id, e);
                return ExitCode::FAILURE;
            }
        };

    let image = pipeline.image_info().size;
    let canvas = config.canvas;
    let focus = Point::new(
        canvas.width as f32 * config.focus_x,
        canvas.height as f32 * config.focus_y,
    );
    let transform = RenderTransform::fit(image, canvas).zoom_about(config.zoom, focus);

    info!("Rendering {}", source_id);
    info!("  Image: {}", image);
    info!("  Canvas: {}", canvas);
    info!("  Scale: {:.4}", transform.max_scale());

    let (_canvas_tx, canvas_rx) = watch::channel(canvas);
    let (_transform_tx, transform_rx) = watch::channel(transform);
    let handle = pipeline.spawn(canvas_rx, transform_rx);

    let mut frames = handle.frames();
    let timeout = Duration::from_millis(config.timeout_ms);
    let waited = tokio::time::timeout(timeout, frames.wait_for(|tiles| is_complete(tiles)))
        .await
        .map(|result| result.map(|tiles| tiles.clone()));
    let tiles = match waited {
        Ok(Ok(tiles)) => tiles,
        Ok(Err(_)) => {
            error!("Pipeline stopped before the frame was complete");
            return finish(handle.dispose().await, ExitCode::FAILURE);
        }
        Err(_) => {
            warn!(
                "Timed out after {}ms, rendering incomplete frame",
                config.timeout_ms
            );
            frames.borrow().clone()
        }
    };

    let decoded = tiles.iter().filter(|t| t.bitmap.is_some()).count();
    info!("  Tiles: {} drawn, {} decoded", tiles.len(), decoded);

    let output = render::compose(&tiles, canvas);
    let code = match save_png(&output, &config.output) {
        Ok(()) => {
            info!("Wrote {}", config.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write {}: {}", config.output.display(), e);
            ExitCode::FAILURE
        }
    };

    finish(handle.dispose().await, code)
}

fn save_png(image: &image::RgbaImage, path: &Path) -> Result<(), image::ImageError> {
    image.save_with_format(path, image::ImageFormat::Png)
}

fn finish(result: Result<(), tilescope::TileError>, code: ExitCode) -> ExitCode {
    match result {
        Ok(()) => code,
        Err(e) => {
            error!("Pipeline error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Grid Command
// =============================================================================

fn run_grid(config: GridConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let grid =
        match TileGrid::generate_with_ceiling(config.canvas, config.image, config.max_base_pixels) {
            Ok(grid) => grid,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };

    match config.format {
        GridOutputFormat::Text => {
            println!("Image:  {}", config.image);
            println!("Canvas: {}", config.canvas);
            println!("Base:   {}", grid.base());
            println!();
            for sample in grid.sample_sizes() {
                let tiles = grid.foreground(sample);
                println!("{}: {} tile(s)", sample, tiles.len());
                for tile in tiles {
                    println!("  {}", tile.bounds);
                }
            }
        }
        GridOutputFormat::Json => match serde_json::to_string_pretty(&grid) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}
