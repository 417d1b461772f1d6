//! Rendering pipeline integration tests.
//!
//! Tests verify:
//! - The 4000x3000 reference image streams base first, then foreground tiles
//! - Canvas changes discard decodes for the previous grid
//! - Off-screen tiles are neither drawn nor decoded
//! - The base tile stays pinned while streaming
//! - Lifecycle states, open failures and disposal

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;

use tilescope::{
    is_complete, DecodedBitmap, PipelineHandle, PipelineState, Point, Rect, RegionTile,
    RenderTransform, SampleSize, Size, SubSamplingPipeline, TileError,
};

use super::test_utils::{
    wait_for_frame, wait_for_state, CollectingReporter, MockDecoder, MockSource, TEST_TIMEOUT,
};

const IMAGE: Size = Size::new(4000, 3000);
const CANVAS: Size = Size::new(1000, 1000);

struct Running {
    handle: PipelineHandle,
    canvas: watch::Sender<Size>,
    transform: watch::Sender<RenderTransform>,
}

fn start(pipeline: SubSamplingPipeline, canvas: Size, transform: RenderTransform) -> Running {
    let (canvas_tx, canvas_rx) = watch::channel(canvas);
    let (transform_tx, transform_rx) = watch::channel(transform);
    Running {
        handle: pipeline.spawn(canvas_rx, transform_rx),
        canvas: canvas_tx,
        transform: transform_tx,
    }
}

fn pipeline_for(decoder: &Arc<MockDecoder>, reporter: &Arc<CollectingReporter>) -> SubSamplingPipeline {
    SubSamplingPipeline::new(decoder.clone(), "reference.jpg", reporter.clone())
}

fn fitted() -> RenderTransform {
    RenderTransform::fit(IMAGE, CANVAS)
}

/// Fitted view zoomed 4x about the canvas centre: one image pixel per canvas pixel.
fn zoomed() -> RenderTransform {
    fitted().zoom_about(4.0, Point::new(500.0, 500.0))
}

fn full_tile(left: u32, top: u32, right: u32, bottom: u32) -> RegionTile {
    RegionTile::new(Rect::new(left, top, right, bottom), SampleSize::FULL)
}

// =============================================================================
// Reference Scenario
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_base_then_foreground_then_base_hidden() {
    let decoder = MockDecoder::gated(4000, 3000);
    let reporter = CollectingReporter::new();
    let preview = DecodedBitmap::new(RgbaImage::new(40, 30));
    let pipeline = pipeline_for(&decoder, &reporter).with_preview(preview.clone());
    let running = start(pipeline, CANVAS, fitted());
    let mut frames = running.handle.frames();

    // Fitted: only the base tile, standing in with the preview.
    let frame = wait_for_frame(&mut frames, |tiles| !tiles.is_empty()).await;
    assert_eq!(frame.len(), 1);
    assert!(frame[0].is_base);
    assert_eq!(frame[0].tile.sample_size.get(), 4);
    assert_eq!(frame[0].bitmap.as_ref(), Some(&preview));

    // Zoomed in: foreground tiles appear as gaps, base still shown.
    running.transform.send_replace(zoomed());
    let frame = wait_for_frame(&mut frames, |tiles| tiles.len() > 1).await;
    assert_eq!(frame.len(), 3);
    assert!(frame[0].is_base);
    assert!(frame[1..].iter().all(|t| !t.is_base && t.bitmap.is_none()));
    assert_eq!(frame[1].tile.sample_size, SampleSize::FULL);

    // Decodes land: base disappears once every visible tile has a bitmap.
    decoder.release();
    let frame = wait_for_frame(&mut frames, |tiles| {
        is_complete(tiles) && tiles.iter().all(|t| !t.is_base)
    })
    .await;
    let mut bounds: Vec<Rect> = frame.iter().map(|t| t.tile.bounds).collect();
    bounds.sort_by_key(|r| r.left);
    assert_eq!(
        bounds,
        vec![Rect::new(1000, 1000, 2000, 2000), Rect::new(2000, 1000, 3000, 2000)]
    );

    assert!(reporter.errors().is_empty());
    running.handle.dispose().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_canvas_resize_discards_old_decodes() {
    let decoder = MockDecoder::gated(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, fitted());
    let mut frames = running.handle.frames();

    running.transform.send_replace(zoomed());
    wait_for_frame(&mut frames, |tiles| tiles.len() == 3).await;
    let old_tiles = [
        full_tile(1000, 1000, 2000, 2000),
        full_tile(2000, 1000, 3000, 2000),
    ];

    // Shrink the canvas while the old grid's decodes are blocked.
    running.canvas.send_replace(Size::new(500, 500));
    let frame = wait_for_frame(&mut frames, |tiles| {
        tiles.iter().any(|t| !t.is_base && t.tile.bounds.width() == 500)
    })
    .await;
    assert_eq!(frame[0].tile.sample_size.get(), 8, "new grid has a new base");

    decoder.release();
    let frame = wait_for_frame(&mut frames, |tiles| {
        is_complete(tiles) && tiles.iter().all(|t| !t.is_base)
    })
    .await;

    // Visible image region is now [1500, 2000) x [1000, 1500).
    assert_eq!(frame.len(), 1);
    assert_eq!(frame[0].tile, full_tile(1500, 1000, 2000, 1500));

    let cache = running.handle.cache();
    assert_eq!(cache.generation().await, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let bitmaps = cache.bitmaps();
    for tile in &old_tiles {
        assert!(!bitmaps.contains_key(tile), "{} survived the resize", tile);
    }

    running.handle.dispose().await.unwrap();
}

// =============================================================================
// Culling and Pinning
// =============================================================================

#[tokio::test]
async fn test_offscreen_tiles_are_not_decoded() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, zoomed());
    let mut frames = running.handle.frames();

    wait_for_frame(&mut frames, |tiles| {
        is_complete(tiles) && tiles.iter().all(|t| !t.is_base)
    })
    .await;

    let decoded = decoder.decoded_tiles();
    let mut foreground: Vec<Rect> = decoded
        .keys()
        .filter(|t| t.sample_size == SampleSize::FULL)
        .map(|t| t.bounds)
        .collect();
    foreground.sort_by_key(|r| r.left);
    assert_eq!(
        foreground,
        vec![Rect::new(1000, 1000, 2000, 2000), Rect::new(2000, 1000, 3000, 2000)]
    );

    running.handle.dispose().await.unwrap();
}

#[tokio::test]
async fn test_image_panned_away_shows_only_base() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let away = RenderTransform::uniform(1.0, Point::new(5000.0, 0.0), Point::new(500.0, 500.0));
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, away);
    let mut frames = running.handle.frames();

    let frame = wait_for_frame(&mut frames, |tiles| is_complete(tiles)).await;
    assert_eq!(frame.len(), 1);
    assert!(frame[0].is_base);
    assert_eq!(decoder.total_calls(), 1);

    running.handle.dispose().await.unwrap();
}

#[tokio::test]
async fn test_base_pinned_while_panning() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, fitted());
    let mut frames = running.handle.frames();

    let frame = wait_for_frame(&mut frames, |tiles| is_complete(tiles)).await;
    let base = frame[0].tile;

    // Pan across the image at full resolution.
    for step in 0..8 {
        let offset = Point::new(-(step as f32) * 400.0, -(step as f32) * 250.0);
        running
            .transform
            .send_replace(RenderTransform::uniform(1.0, offset, Point::new(500.0, 500.0)));
        wait_for_frame(&mut frames, |tiles| {
            is_complete(tiles)
                && tiles.iter().all(|t| {
                    !t.is_base && t.draw_bounds.left == t.tile.bounds.left as f32 + offset.x
                })
        })
        .await;
        assert!(running.handle.cache().bitmaps().contains_key(&base));
    }

    assert_eq!(decoder.calls(&base), 1);
    running.handle.dispose().await.unwrap();
}

#[tokio::test]
async fn test_unchanged_draw_list_not_reemitted() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, zoomed());
    let mut frames = running.handle.frames();

    wait_for_frame(&mut frames, |tiles| {
        is_complete(tiles) && tiles.iter().all(|t| !t.is_base)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    frames.borrow_and_update();

    // Same transform again: nothing to emit.
    running.transform.send_replace(zoomed());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!frames.has_changed().unwrap());

    // A one pixel pan keeps the same tiles but moves them.
    let mut nudged = zoomed();
    nudged.offset.x += 1.0;
    running.transform.send_replace(nudged);
    wait_for_frame(&mut frames, |tiles| {
        tiles.first().is_some_and(|t| t.draw_bounds.left == -499.0)
    })
    .await;

    running.handle.dispose().await.unwrap();
}

#[tokio::test]
async fn test_failed_tile_backed_by_base() {
    let decoder = MockDecoder::new(4000, 3000);
    decoder.fail_once(Rect::new(2000, 1000, 3000, 2000));
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, zoomed());
    let mut frames = running.handle.frames();

    // One tile fails: the frame keeps the base underneath the gap.
    let frame = wait_for_frame(&mut frames, |tiles| {
        tiles.iter().filter(|t| t.bitmap.is_some()).count() == 2
    })
    .await;
    assert!(frame[0].is_base);
    assert_eq!(frame.len(), 3);

    tokio::time::timeout(TEST_TIMEOUT, async {
        while reporter.errors().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("failure was not reported");
    assert_eq!(reporter.errors().len(), 1);
    assert!(matches!(
        reporter.errors()[0].0,
        TileError::RegionDecode { .. }
    ));

    // A later frame that still needs the tile retries it.
    let mut nudged = zoomed();
    nudged.offset.y += 10.0;
    running.transform.send_replace(nudged);
    wait_for_frame(&mut frames, |tiles| {
        is_complete(tiles) && tiles.iter().all(|t| !t.is_base)
    })
    .await;

    running.handle.dispose().await.unwrap();
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_state_transitions_and_dispose() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), Size::new(1000, 0), fitted());
    let mut states = running.handle.state();
    let frames = running.handle.frames();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*states.borrow(), PipelineState::AwaitingCanvasSize);

    running.canvas.send_replace(CANVAS);
    wait_for_state(&mut states, PipelineState::Streaming).await;

    let cache = running.handle.cache().clone();
    running.handle.dispose().await.unwrap();

    assert_eq!(*states.borrow(), PipelineState::Disposed);
    assert!(frames.borrow().is_empty());
    assert!(cache.is_disposed().await);
    assert!(cache.bitmaps().is_empty());
    assert!(decoder.is_closed());
}

#[tokio::test]
async fn test_dropping_handle_disposes() {
    let decoder = MockDecoder::new(4000, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, fitted());
    let mut states = running.handle.state();
    wait_for_state(&mut states, PipelineState::Streaming).await;

    drop(running.handle);
    wait_for_state(&mut states, PipelineState::Disposed).await;
    assert!(decoder.is_closed());
}

#[tokio::test]
async fn test_invalid_image_size_reported() {
    let decoder = MockDecoder::new(0, 3000);
    let reporter = CollectingReporter::new();
    let running = start(pipeline_for(&decoder, &reporter), CANVAS, fitted());
    let mut states = running.handle.state();

    wait_for_state(&mut states, PipelineState::Disposed).await;
    assert!(running.handle.frames().borrow().is_empty());
    assert_eq!(decoder.total_calls(), 0);

    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0].0,
        TileError::InvalidImageSize {
            width: 0,
            height: 3000
        }
    ));
    assert!(matches!(
        running.handle.dispose().await,
        Err(TileError::InvalidImageSize { .. })
    ));
}

#[tokio::test]
async fn test_open_failure_reported() {
    let source = MockSource::failing();
    let reporter = CollectingReporter::new();

    let result = SubSamplingPipeline::open(&source, "missing.jpg", reporter.clone()).await;

    assert!(matches!(result, Err(TileError::DecoderOpen(_))));
    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, "missing.jpg");
}

#[tokio::test]
async fn test_open_through_source() {
    let decoder = MockDecoder::new(4000, 3000);
    let source = MockSource::new(decoder.clone());
    let reporter = CollectingReporter::new();

    let pipeline = SubSamplingPipeline::open(&source, "reference.jpg", reporter.clone())
        .await
        .unwrap();

    assert_eq!(source.open_count(), 1);
    assert_eq!(pipeline.image_info().size, IMAGE);
    assert!(reporter.errors().is_empty());
}
