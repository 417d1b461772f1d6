//! Tile cache driven by a required set.
//!
//! The pipeline tells the cache which tiles it currently needs through
//! [`TileCache::update_required_set`]. The cache decodes what is missing,
//! releases what is no longer needed, and publishes the decoded bitmaps as a
//! `watch` channel snapshot.
//!
//! # Entries
//!
//! A tile is either absent, decoding, or ready. At most one decode per tile is
//! in flight: a tile that is already decoding is never scheduled again.
//!
//! A decode that is already inside the decoder cannot be interrupted. When its
//! tile is released, the cache keeps tracking it until it returns, and a
//! required set that names the tile again adopts that decode instead of
//! starting a second one.
//!
//! # Scheduling
//!
//! New decodes go onto a single queue in required-set order. One dispatcher
//! task drains it, taking a concurrency permit before starting each decode, so
//! decodes begin in priority order. Queued decodes whose tile was released are
//! skipped.
//!
//! # Pinned base tile
//!
//! The base tile lives in its own slot outside the foreground map. Foreground
//! churn never touches it; it is only released when the required set names a
//! different base tile, or on disposal.
//!
//! # Generations
//!
//! [`TileCache::invalidate`] starts a new generation: queued and running
//! foreground decodes are dropped from their entries and any result that
//! arrives without a matching entry is discarded.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, trace};

use super::RegionTile;
use crate::config::DEFAULT_MAX_CONCURRENT_DECODES;
use crate::decoder::{DecodedBitmap, RegionDecoder};
use crate::error::{DecoderError, TileError};
use crate::reporter::ErrorReporter;

/// Decoded bitmaps keyed by tile, as published to observers.
pub type BitmapSnapshot = Arc<HashMap<RegionTile, DecodedBitmap>>;

// =============================================================================
// Required Set
// =============================================================================

/// Tiles the pipeline currently needs, in decode priority order.
///
/// The base tile always comes first and is always required, whether or not it
/// is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSet {
    pub base: RegionTile,

    /// Foreground tiles, highest priority first
    pub foreground: Vec<RegionTile>,
}

impl RequiredSet {
    pub fn new(base: RegionTile, foreground: Vec<RegionTile>) -> Self {
        Self { base, foreground }
    }

    /// All required tiles in priority order, base first.
    pub fn iter(&self) -> impl Iterator<Item = &RegionTile> {
        std::iter::once(&self.base).chain(self.foreground.iter())
    }

    /// Number of required tiles, counting the base.
    pub fn len(&self) -> usize {
        1 + self.foreground.len()
    }

    /// Always false: a required set holds at least the base tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, tile: &RegionTile) -> bool {
        self.iter().any(|t| t == tile)
    }
}

// =============================================================================
// Cache State
// =============================================================================

struct InFlight {
    generation: u64,
    ticket: u64,
}

enum Entry {
    Decoding(InFlight),
    Ready(DecodedBitmap),
}

impl Entry {
    fn is_ticket(&self, ticket: u64) -> bool {
        matches!(self, Entry::Decoding(in_flight) if in_flight.ticket == ticket)
    }

    fn is_ready(&self) -> bool {
        matches!(self, Entry::Ready(_))
    }
}

/// A decode waiting in the dispatch queue.
#[derive(Debug, Clone, Copy)]
struct Job {
    tile: RegionTile,
    generation: u64,
    ticket: u64,
}

struct PinnedBase {
    tile: RegionTile,
    /// `None` while absent
    entry: Option<Entry>,
}

/// Where a completed decode lands.
enum Slot {
    Base,
    Foreground,
}

struct CacheState {
    generation: u64,
    next_ticket: u64,
    required: Option<RequiredSet>,
    base: Option<PinnedBase>,
    foreground: HashMap<RegionTile, Entry>,
    /// Tickets of decodes inside the decoder, kept until they return even if
    /// their entry is gone.
    running: HashMap<RegionTile, u64>,
    disposed: bool,
}

impl CacheState {
    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// The slot whose decoding entry holds `ticket`, if any.
    fn slot_for(&self, tile: &RegionTile, ticket: u64) -> Option<Slot> {
        let owns_base = self.base.as_ref().is_some_and(|b| {
            b.tile == *tile && b.entry.as_ref().is_some_and(|e| e.is_ticket(ticket))
        });
        if owns_base {
            return Some(Slot::Base);
        }
        self.foreground
            .get(tile)
            .filter(|e| e.is_ticket(ticket))
            .map(|_| Slot::Foreground)
    }

    /// Decoding entry for a tile that just became required.
    ///
    /// A decode still running for the tile is adopted; otherwise a new one is
    /// queued behind everything queued before it.
    fn schedule(&mut self, tile: RegionTile, jobs: &mpsc::UnboundedSender<Job>) -> Entry {
        let generation = self.generation;
        if let Some(&ticket) = self.running.get(&tile) {
            trace!(%tile, ticket, "Adopting running decode");
            return Entry::Decoding(InFlight { generation, ticket });
        }

        let ticket = self.take_ticket();
        if jobs.send(Job { tile, generation, ticket }).is_err() {
            debug!(%tile, "Decode dispatcher has stopped");
        }
        Entry::Decoding(InFlight { generation, ticket })
    }

    fn snapshot(&self) -> BitmapSnapshot {
        let mut bitmaps = HashMap::with_capacity(self.foreground.len() + 1);
        if let Some(PinnedBase {
            tile,
            entry: Some(Entry::Ready(bitmap)),
        }) = &self.base
        {
            bitmaps.insert(*tile, bitmap.clone());
        }
        for (tile, entry) in &self.foreground {
            if let Entry::Ready(bitmap) = entry {
                bitmaps.insert(*tile, bitmap.clone());
            }
        }
        Arc::new(bitmaps)
    }

    fn in_flight(&self) -> usize {
        let mut tiles: HashSet<RegionTile> = self.running.keys().copied().collect();
        if let Some(PinnedBase {
            tile,
            entry: Some(Entry::Decoding(_)),
        }) = &self.base
        {
            tiles.insert(*tile);
        }
        tiles.extend(
            self.foreground
                .iter()
                .filter(|(_, e)| matches!(e, Entry::Decoding(_)))
                .map(|(tile, _)| *tile),
        );
        tiles.len()
    }
}

struct Shared {
    decoder: Arc<dyn RegionDecoder>,
    reporter: Arc<dyn ErrorReporter>,
    source_id: Arc<str>,
    permits: Arc<Semaphore>,
    state: Mutex<CacheState>,
    snapshot: watch::Sender<BitmapSnapshot>,
    jobs: mpsc::UnboundedSender<Job>,
    dispatcher: AbortHandle,
}

impl Shared {
    fn publish(&self, state: &CacheState) {
        self.snapshot.send_replace(state.snapshot());
    }

    /// Whether a queued job still has an entry waiting for it.
    async fn is_wanted(&self, job: &Job) -> bool {
        let state = self.state.lock().await;
        !state.disposed && state.slot_for(&job.tile, job.ticket).is_some()
    }

    /// Mark the job as running, unless its entry went away while it waited.
    async fn start(&self, job: &Job) -> bool {
        let mut state = self.state.lock().await;
        if state.disposed || state.slot_for(&job.tile, job.ticket).is_none() {
            return false;
        }
        state.running.insert(job.tile, job.ticket);
        true
    }

    async fn complete(
        &self,
        job: Job,
        result: Result<Result<DecodedBitmap, DecoderError>, JoinError>,
    ) {
        let Job {
            tile,
            generation,
            ticket,
        } = job;

        let failure = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.running.get(&tile) == Some(&ticket) {
                state.running.remove(&tile);
            }
            if state.disposed {
                return;
            }

            let Some(slot) = state.slot_for(&tile, ticket) else {
                debug!(%tile, generation, current = state.generation, "Discarding stale decode");
                return;
            };

            let (bitmap, failure) = match result {
                Ok(Ok(bitmap)) => (Some(bitmap), None),
                Ok(Err(e)) if e.is_closed() => (None, None),
                Ok(Err(e)) => (None, Some(e)),
                Err(e) if e.is_cancelled() => (None, None),
                Err(e) => {
                    let error = DecoderError::Decode(format!("Decode task failed: {}", e));
                    (None, Some(error))
                }
            };

            let ready = bitmap.is_some();
            match slot {
                Slot::Base => {
                    if let Some(base) = state.base.as_mut() {
                        base.entry = bitmap.map(Entry::Ready);
                    }
                }
                Slot::Foreground => match bitmap {
                    Some(bitmap) => {
                        state.foreground.insert(tile, Entry::Ready(bitmap));
                    }
                    None => {
                        state.foreground.remove(&tile);
                    }
                },
            }

            if ready {
                trace!(%tile, "Tile decoded");
                self.publish(state);
            }
            failure
        };

        if let Some(source) = failure {
            self.reporter
                .report(&TileError::RegionDecode { tile, source }, &self.source_id);
        }
    }
}

/// Start queued decodes one at a time, in queue order, each once a permit is
/// free.
async fn dispatch(cache: Weak<Shared>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let Some(shared) = cache.upgrade() else {
            break;
        };
        if !shared.is_wanted(&job).await {
            trace!(tile = %job.tile, "Skipping released decode");
            continue;
        }
        let Ok(permit) = Arc::clone(&shared.permits).acquire_owned().await else {
            break;
        };
        if !shared.start(&job).await {
            continue;
        }

        let decoder = Arc::clone(&shared.decoder);
        let tile = job.tile;
        let decode = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            decoder.decode_region(tile.bounds, tile.sample_size)
        });
        tokio::spawn(async move {
            let result = decode.await;
            shared.complete(job, result).await;
        });
    }
    trace!("Decode dispatcher stopped");
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Cache of decoded tiles for one image source.
///
/// Cloning is cheap; clones share the same state. Constructors spawn the
/// decode dispatcher and must be called from within a Tokio runtime.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tilescope::decoder::ImageRegionDecoder;
/// use tilescope::geometry::Size;
/// use tilescope::reporter::TracingErrorReporter;
/// use tilescope::tile::{RequiredSet, TileCache, TileGrid};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let decoder = ImageRegionDecoder::from_rgba(image::RgbaImage::new(4000, 3000));
///     let grid = TileGrid::generate(Size::new(1000, 1000), Size::new(4000, 3000))?;
///
///     let cache = TileCache::new(Arc::new(decoder), "photo.jpg", Arc::new(TracingErrorReporter));
///     let mut bitmaps = cache.current_bitmaps();
///
///     cache.update_required_set(RequiredSet::new(grid.base(), vec![])).await;
///     bitmaps.wait_for(|snapshot| snapshot.contains_key(&grid.base())).await?;
///
///     cache.dispose().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TileCache {
    shared: Arc<Shared>,
}

impl TileCache {
    /// Create a cache with the default decode concurrency.
    pub fn new(
        decoder: Arc<dyn RegionDecoder>,
        source_id: impl Into<Arc<str>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self::with_concurrency(decoder, source_id, reporter, DEFAULT_MAX_CONCURRENT_DECODES)
    }

    /// Create a cache running at most `max_concurrent_decodes` decodes at once.
    pub fn with_concurrency(
        decoder: Arc<dyn RegionDecoder>,
        source_id: impl Into<Arc<str>>,
        reporter: Arc<dyn ErrorReporter>,
        max_concurrent_decodes: usize,
    ) -> Self {
        let (snapshot, _) = watch::channel(BitmapSnapshot::default());
        let (jobs, queue) = mpsc::unbounded_channel();
        let source_id = source_id.into();

        // The dispatcher only upgrades its handle after receiving a job, and
        // jobs are only sent through the finished `Shared`.
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| Shared {
            decoder,
            reporter,
            source_id,
            permits: Arc::new(Semaphore::new(max_concurrent_decodes.max(1))),
            state: Mutex::new(CacheState {
                generation: 0,
                next_ticket: 0,
                required: None,
                base: None,
                foreground: HashMap::new(),
                running: HashMap::new(),
                disposed: false,
            }),
            snapshot,
            jobs,
            dispatcher: tokio::spawn(dispatch(weak.clone(), queue)).abort_handle(),
        });

        Self { shared }
    }

    /// Observe decoded bitmaps. The receiver always sees the latest snapshot.
    pub fn current_bitmaps(&self) -> watch::Receiver<BitmapSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// The latest published snapshot.
    pub fn bitmaps(&self) -> BitmapSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn source_id(&self) -> &str {
        &self.shared.source_id
    }

    /// Replace the set of required tiles.
    ///
    /// Repeating the previous set is a no-op. Otherwise:
    /// - a different base tile replaces the pinned one,
    /// - foreground tiles missing from `required` are released, and their
    ///   queued decodes skipped,
    /// - required tiles that are neither decoded nor decoding are queued for
    ///   decoding in the order given, or adopt a decode of the same tile that
    ///   is still running.
    ///
    /// A tile whose decode failed is absent again and is retried by the next
    /// call that still names it.
    pub async fn update_required_set(&self, required: RequiredSet) {
        let mut guard = self.shared.state.lock().await;
        let state = &mut *guard;
        if state.disposed || state.required.as_ref() == Some(&required) {
            return;
        }

        let jobs = &self.shared.jobs;
        let mut released = 0usize;
        let mut started = 0usize;

        if state.base.as_ref().map(|b| b.tile) != Some(required.base) {
            if let Some(old) = state.base.take() {
                debug!(old = %old.tile, new = %required.base, "Replacing base tile");
                released += usize::from(old.entry.is_some_and(|e| e.is_ready()));
            }
            state.base = Some(PinnedBase {
                tile: required.base,
                entry: None,
            });
        }

        if state.base.as_ref().is_some_and(|b| b.entry.is_none()) {
            let entry = state.schedule(required.base, jobs);
            if let Some(base) = state.base.as_mut() {
                base.entry = Some(entry);
            }
            started += 1;
        }

        let wanted: HashSet<RegionTile> = required.foreground.iter().copied().collect();
        state.foreground.retain(|tile, entry| {
            let keep = wanted.contains(tile);
            if !keep && entry.is_ready() {
                released += 1;
            }
            keep
        });

        for tile in &required.foreground {
            if state.foreground.contains_key(tile) {
                continue;
            }
            let entry = state.schedule(*tile, jobs);
            state.foreground.insert(*tile, entry);
            started += 1;
        }

        debug!(
            source_id = %self.shared.source_id,
            generation = state.generation,
            required = required.len(),
            started,
            released,
            "Updated required tiles"
        );

        state.required = Some(required);
        if released > 0 {
            self.shared.publish(state);
        }
    }

    /// Start a new generation.
    ///
    /// Drops every decoding foreground entry and forgets the last required
    /// set. Decoded tiles stay until the next required set leaves them out. The
    /// pinned base tile and its decode are untouched.
    pub async fn invalidate(&self) -> u64 {
        let mut state = self.shared.state.lock().await;
        state.generation += 1;
        state.required = None;

        let mut cancelled = 0usize;
        state.foreground.retain(|tile, entry| match entry {
            Entry::Decoding(in_flight) => {
                trace!(%tile, generation = in_flight.generation, "Dropping decode");
                cancelled += 1;
                false
            }
            Entry::Ready(_) => true,
        });

        debug!(generation = state.generation, cancelled, "Invalidated tile cache");
        state.generation
    }

    /// Tear the cache down.
    ///
    /// Stops the dispatcher, releases all bitmaps and publishes an empty
    /// snapshot. Decodes already inside the decoder run to completion and
    /// their results are dropped. Later calls on the cache have no effect.
    pub async fn dispose(&self) {
        let mut state = self.shared.state.lock().await;
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.required = None;
        state.base = None;
        state.foreground.clear();
        state.running.clear();

        self.shared.dispatcher.abort();
        self.shared.permits.close();
        self.shared.publish(&state);

        debug!(source_id = %self.shared.source_id, "Disposed tile cache");
    }

    pub async fn is_disposed(&self) -> bool {
        self.shared.state.lock().await.disposed
    }

    /// Current generation, bumped by every [`TileCache::invalidate`].
    pub async fn generation(&self) -> u64 {
        self.shared.state.lock().await.generation
    }

    /// Number of tiles with a decode queued or running.
    ///
    /// Counts decodes whose tile was released but which have not returned yet.
    pub async fn in_flight(&self) -> usize {
        self.shared.state.lock().await.in_flight()
    }

    /// Whether `tile` is required and currently decoding.
    pub async fn is_decoding(&self, tile: &RegionTile) -> bool {
        let state = self.shared.state.lock().await;
        let base = state.base.as_ref().is_some_and(|b| {
            b.tile == *tile && matches!(b.entry, Some(Entry::Decoding(_)))
        });
        base || matches!(state.foreground.get(tile), Some(Entry::Decoding(_)))
    }

    /// Bytes held by decoded bitmaps.
    pub fn byte_size(&self) -> usize {
        self.bitmaps().values().map(DecodedBitmap::byte_size).sum()
    }
}


// =============================================================================
// Tests
// =============================================================================
