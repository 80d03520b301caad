use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::cache::budget::BufferBudget;
use crate::decode::{FrameUnavailable, IncrementalDecoder};
use crate::foundation::core::{FrameBitmap, FrameHandle};
use crate::foundation::error::LoopframeResult;

/// What [`FrameBufferCache::request_frame`] does on a miss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestPolicy {
    /// Schedule the decode and return `None` right away.
    #[default]
    NonBlocking,
    /// Schedule the decode and wait up to the given time for it.
    Wait(Duration),
}

/// Indices that matter for retention, relative to a playback position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheWindow {
    /// Current frame.
    pub center: usize,
    /// Frames after `center` to keep and prefetch.
    pub lookahead: usize,
    /// Frames before `center` to keep.
    pub lookbehind: usize,
}

impl CacheWindow {
    /// Whether `index` is inside the window, wrapping at `frame_count`.
    pub fn contains(self, index: usize, frame_count: usize) -> bool {
        if frame_count == 0 {
            return false;
        }
        if self.lookahead.saturating_add(self.lookbehind) + 1 >= frame_count {
            return true;
        }
        let ahead = (index + frame_count - self.center % frame_count) % frame_count;
        let behind = (self.center % frame_count + frame_count - index) % frame_count;
        ahead <= self.lookahead || behind <= self.lookbehind
    }

    /// Circular distance of `index` from the center.
    pub fn distance(self, index: usize, frame_count: usize) -> usize {
        if frame_count == 0 {
            return 0;
        }
        let center = self.center % frame_count;
        let d = index.abs_diff(center) % frame_count;
        d.min(frame_count - d)
    }
}

/// Counters describing cache behavior since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    /// Frames currently held.
    pub cached_frames: usize,
    /// Accounted bytes currently held.
    pub cached_bytes: usize,
    /// Effective byte budget, `None` when unbounded.
    pub budget_bytes: Option<usize>,
    /// `request_frame` calls served from memory.
    pub hits: u64,
    /// `request_frame` calls that had to wait for or schedule a decode.
    pub misses: u64,
    /// Decodes completed by the worker (successful or not).
    pub decodes: u64,
    /// Decodes that produced no bitmap because the frame is corrupt.
    pub decode_failures: u64,
    /// Frames dropped to get back under budget.
    pub evictions: u64,
    /// Prefetches not scheduled because the budget had no headroom.
    pub prefetch_skipped: u64,
    /// Prefetch jobs dropped because the window moved before they ran.
    pub stale_jobs: u64,
}

/// One decoded frame held by the cache.
#[derive(Clone, Debug)]
struct CachedFrame {
    index: usize,
    bitmap: FrameHandle,
    byte_size: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JobKind {
    Demand,
    Prefetch,
}

#[derive(Clone, Copy, Debug)]
struct DecodeJob {
    index: usize,
    kind: JobKind,
    epoch: u64,
}

struct DecodeOutcome {
    index: usize,
    generation: u64,
    result: Result<FrameBitmap, FrameUnavailable>,
}

struct CacheState {
    frames: HashMap<usize, CachedFrame>,
    total_bytes: usize,
    in_flight: HashSet<usize>,
    /// Index -> data generation at the time the decode failed.
    failed: HashMap<usize, u64>,
    window: CacheWindow,
    epoch: u64,
    budget: BufferBudget,
    frame_hint: usize,
    /// Last index demanded through `request_frame`; never evicted.
    pinned: Option<usize>,
    stats: CacheStats,
    results: mpsc::Receiver<DecodeOutcome>,
}

struct Shared {
    decoder: Arc<IncrementalDecoder>,
    state: Mutex<CacheState>,
    ready: Condvar,
    cancelled: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded-memory map from frame index to decoded bitmap, fed by one background worker.
///
/// When every frame fits in the budget (or the budget is unbounded) the cache keeps everything it
/// decodes. Otherwise it keeps a window around the playback position and evicts the frames
/// farthest from it. Bitmaps are shared [`FrameHandle`]s: evicting a frame never invalidates a
/// handle a consumer already holds.
///
/// Dropping the cache cancels queued work. A decode already running finishes on the worker and its
/// result is discarded.
pub struct FrameBufferCache {
    shared: Arc<Shared>,
    jobs: mpsc::Sender<DecodeJob>,
}

impl std::fmt::Debug for FrameBufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FrameBufferCache {
    /// Create a cache over `decoder` and start its decode worker.
    pub fn new(decoder: Arc<IncrementalDecoder>, budget: BufferBudget) -> LoopframeResult<Self> {
        let (job_tx, job_rx) = mpsc::channel::<DecodeJob>();
        let (result_tx, result_rx) = mpsc::channel::<DecodeOutcome>();

        let shared = Arc::new(Shared {
            decoder,
            state: Mutex::new(CacheState {
                frames: HashMap::new(),
                total_bytes: 0,
                in_flight: HashSet::new(),
                failed: HashMap::new(),
                window: CacheWindow::default(),
                epoch: 0,
                budget,
                frame_hint: 0,
                pinned: None,
                stats: CacheStats {
                    budget_bytes: budget.limit(),
                    ..CacheStats::default()
                },
                results: result_rx,
            }),
            ready: Condvar::new(),
            cancelled: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("loopframe-decode".into())
            .spawn(move || run_worker(&worker_shared, &job_rx, &result_tx))
            .context("spawn frame decode worker")?;

        Ok(Self {
            shared,
            jobs: job_tx,
        })
    }

    /// Decoder this cache reads from.
    pub fn decoder(&self) -> &Arc<IncrementalDecoder> {
        &self.shared.decoder
    }

    /// Set the retention budget.
    ///
    /// `max_bytes_per_frame_hint` sizes frames before the canvas is known (0 = no hint). Frames
    /// over the new budget are evicted right away.
    pub fn configure(&self, budget: BufferBudget, max_bytes_per_frame_hint: usize) {
        let mut st = self.shared.lock();
        st.budget = budget;
        st.frame_hint = max_bytes_per_frame_hint;
        st.stats.budget_bytes = budget.limit();
        self.drain(&mut st);
        self.evict(&mut st);
        tracing::debug!(?budget, eager = self.eager(&st), "cache configured");
    }

    /// Declare the hot window and prefetch into it.
    pub fn set_window(&self, center: usize, lookahead: usize, lookbehind: usize) {
        let window = CacheWindow {
            center,
            lookahead,
            lookbehind,
        };
        let mut st = self.shared.lock();
        if st.window != window {
            st.window = window;
            st.epoch = st.epoch.wrapping_add(1);
        }
        self.drain(&mut st);
        self.evict(&mut st);
        self.schedule_window(&mut st);
    }

    /// Current hot window.
    pub fn window(&self) -> CacheWindow {
        self.shared.lock().window
    }

    /// Bitmap for frame `index`.
    ///
    /// A hit returns immediately. On a miss the decode is scheduled (or joined, if one is already
    /// in flight) and `policy` decides whether to wait for it. Either way the window after the
    /// current center is prefetched.
    pub fn request_frame(&self, index: usize, policy: RequestPolicy) -> Option<FrameHandle> {
        let mut st = self.shared.lock();
        self.drain(&mut st);

        if index >= self.shared.decoder.frame_count() {
            return None;
        }
        st.pinned = Some(index);

        if let Some(hit) = st.frames.get(&index).map(|f| Arc::clone(&f.bitmap)) {
            st.stats.hits += 1;
            self.schedule_window(&mut st);
            return Some(hit);
        }
        st.stats.misses += 1;

        if !self.retry_allowed(&mut st, index) {
            return None;
        }
        self.schedule(&mut st, index, JobKind::Demand);
        self.schedule_window(&mut st);

        let RequestPolicy::Wait(timeout) = policy else {
            return None;
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(f) = st.frames.get(&index) {
                return Some(Arc::clone(&f.bitmap));
            }
            if !st.in_flight.contains(&index) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .ready
                .wait_timeout(st, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            st = guard;
            self.drain(&mut st);
        }
    }

    /// Cached bitmap for `index` without scheduling anything.
    pub fn peek(&self, index: usize) -> Option<FrameHandle> {
        let mut st = self.shared.lock();
        self.drain(&mut st);
        st.frames.get(&index).map(|f| Arc::clone(&f.bitmap))
    }

    /// Whether every frame fits in the budget, so nothing is ever evicted.
    pub fn is_eager(&self) -> bool {
        let st = self.shared.lock();
        self.eager(&st)
    }

    /// Lookahead that fits the budget next to the current frame and one frame behind it.
    pub fn suggested_lookahead(&self) -> usize {
        let st = self.shared.lock();
        let frame_count = self.shared.decoder.frame_count();
        if self.eager(&st) {
            return frame_count.saturating_sub(1).max(1);
        }
        st.budget
            .frame_slots(self.frame_cost(&st))
            .saturating_sub(2)
            .max(1)
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> CacheStats {
        let mut st = self.shared.lock();
        self.drain(&mut st);
        let mut stats = st.stats.clone();
        stats.cached_frames = st.frames.len();
        stats.cached_bytes = st.total_bytes;
        stats
    }

    /// Indices currently held, ascending.
    pub fn cached_indices(&self) -> Vec<usize> {
        let mut st = self.shared.lock();
        self.drain(&mut st);
        let mut v: Vec<usize> = st.frames.keys().copied().collect();
        v.sort_unstable();
        v
    }

    fn frame_cost(&self, st: &CacheState) -> usize {
        let canvas = self.shared.decoder.meta().canvas().byte_len();
        if canvas > 0 { canvas } else { st.frame_hint.max(1) }
    }

    fn eager(&self, st: &CacheState) -> bool {
        let frame_count = self.shared.decoder.frame_count();
        st.budget
            .admits(frame_count.saturating_mul(self.frame_cost(st)))
    }

    /// Whether a failed index may be decoded again (new bytes arrived since it failed).
    fn retry_allowed(&self, st: &mut CacheState, index: usize) -> bool {
        match st.failed.get(&index) {
            None => true,
            Some(&generation) if generation != self.shared.decoder.data_generation() => {
                st.failed.remove(&index);
                true
            }
            Some(_) => false,
        }
    }

    fn schedule(&self, st: &mut CacheState, index: usize, kind: JobKind) -> bool {
        if st.frames.contains_key(&index) || st.in_flight.contains(&index) {
            return true;
        }
        let job = DecodeJob {
            index,
            kind,
            epoch: st.epoch,
        };
        if self.jobs.send(job).is_err() {
            return false;
        }
        st.in_flight.insert(index);
        tracing::trace!(index, ?kind, "decode scheduled");
        true
    }

    /// Queue prefetches from the window center forward while the budget has headroom.
    fn schedule_window(&self, st: &mut CacheState) {
        let frame_count = self.shared.decoder.frame_count();
        if frame_count == 0 {
            return;
        }
        let eager = self.eager(st);
        let cost = self.frame_cost(st);
        let center = st.window.center.min(frame_count - 1);
        let span = if eager {
            frame_count - 1
        } else {
            st.window.lookahead.min(frame_count - 1)
        };

        for step in 0..=span {
            let index = (center + step) % frame_count;
            if st.frames.contains_key(&index) || st.in_flight.contains(&index) {
                continue;
            }
            if !self.retry_allowed(st, index) {
                continue;
            }
            let projected = st
                .total_bytes
                .saturating_add((st.in_flight.len() + 1).saturating_mul(cost));
            if step > 0 && !eager && !st.budget.admits(projected) {
                st.stats.prefetch_skipped += 1;
                tracing::trace!(index, projected, "prefetch limited by budget");
                break;
            }
            if !self.schedule(st, index, JobKind::Prefetch) {
                break;
            }
        }
    }

    /// Move finished decodes from the worker channel into the map.
    fn drain(&self, st: &mut CacheState) {
        let mut inserted = false;
        while let Ok(outcome) = st.results.try_recv() {
            st.in_flight.remove(&outcome.index);
            st.stats.decodes += 1;
            match outcome.result {
                Ok(bitmap) => {
                    let byte_size = bitmap.byte_cost();
                    let frame = CachedFrame {
                        index: outcome.index,
                        bitmap: Arc::new(bitmap),
                        byte_size,
                    };
                    if let Some(old) = st.frames.insert(outcome.index, frame) {
                        st.total_bytes -= old.byte_size;
                    }
                    st.total_bytes += byte_size;
                    st.failed.remove(&outcome.index);
                    inserted = true;
                }
                Err(FrameUnavailable::Corrupt) => {
                    st.stats.decode_failures += 1;
                    st.failed.insert(outcome.index, outcome.generation);
                }
                Err(FrameUnavailable::Incomplete) => {}
            }
        }
        if inserted {
            self.evict(st);
        }
    }

    /// Drop frames until under budget, farthest from the window center first. Frames outside the
    /// window go before hot ones; the pinned and center frames are never dropped.
    fn evict(&self, st: &mut CacheState) {
        let Some(limit) = st.budget.limit() else {
            return;
        };
        let frame_count = self.shared.decoder.frame_count();
        let window = st.window;
        let center = (frame_count > 0).then(|| window.center % frame_count);
        while st.total_bytes > limit {
            let victim = st
                .frames
                .values()
                .filter(|f| Some(f.index) != st.pinned && Some(f.index) != center)
                .max_by_key(|f| {
                    (
                        !window.contains(f.index, frame_count),
                        window.distance(f.index, frame_count),
                        f.index,
                    )
                })
                .map(|f| (f.index, window.contains(f.index, frame_count)));
            let Some((index, hot)) = victim else {
                tracing::trace!(
                    bytes = st.total_bytes,
                    limit,
                    "only the pinned frame is left, budget is soft"
                );
                break;
            };
            if let Some(old) = st.frames.remove(&index) {
                st.total_bytes -= old.byte_size;
                st.stats.evictions += 1;
                tracing::debug!(index, hot, bytes = old.byte_size, "evicted frame");
            }
        }
    }
}

impl Drop for FrameBufferCache {
    fn drop(&mut self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.ready.notify_all();
    }
}

fn run_worker(
    shared: &Shared,
    jobs: &mpsc::Receiver<DecodeJob>,
    results: &mpsc::Sender<DecodeOutcome>,
) {
    tracing::debug!("decode worker started");
    while let Ok(job) = jobs.recv() {
        if shared.cancelled.load(Ordering::SeqCst) {
            break;
        }
        if job.kind == JobKind::Prefetch {
            let mut st = shared.lock();
            let frame_count = shared.decoder.frame_count();
            if job.epoch != st.epoch
                && st.pinned != Some(job.index)
                && !st.window.contains(job.index, frame_count)
            {
                st.in_flight.remove(&job.index);
                st.stats.stale_jobs += 1;
                shared.ready.notify_all();
                continue;
            }
        }

        let generation = shared.decoder.data_generation();
        let result = shared.decoder.try_decode_frame(job.index, true);
        if shared.cancelled.load(Ordering::SeqCst) {
            break;
        }
        if let Err(FrameUnavailable::Corrupt) = result {
            tracing::warn!(index = job.index, "frame decode failed");
        }
        let outcome = DecodeOutcome {
            index: job.index,
            generation,
            result,
        };
        if results.send(outcome).is_err() {
            break;
        }
        // Taking the lock orders the send before any waiter's next drain.
        let _guard = shared.lock();
        shared.ready.notify_all();
    }
    tracing::debug!("decode worker exiting");
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
