use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::cache::{FrameBufferCache, RequestPolicy};
use crate::foundation::core::FrameHandle;
use crate::playback::control::{PlaybackCommand, PlaybackControl};
use crate::playback::state::{AdvanceReport, PlayState, PlaybackState, PlaybackStats};
use crate::playback::surface::RenderSurface;

/// Frames kept behind the current position.
const LOOKBEHIND: usize = 1;
/// Whole passes over the animation one tick steps through frame by frame before skipping ahead.
const MAX_PASSES_PER_TICK: usize = 4;

/// Playback behavior knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackOptions {
    /// Start playing as soon as more than one frame is known.
    pub auto_play: bool,
    /// Replaces the container's loop count (0 = forever).
    pub loop_count_override: Option<u32>,
    /// Longest time to hold a frame waiting for the next bitmap before skipping it.
    pub max_stall: Duration,
    /// Longest time one `advance` blocks waiting for a bitmap (zero = never block).
    pub display_wait: Duration,
    /// Prefetch depth; `None` lets the cache derive it from its budget.
    pub lookahead: Option<usize>,
    /// Whether `play` after `Finished` starts over.
    pub replay_after_finish: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            auto_play: true,
            loop_count_override: None,
            max_stall: Duration::from_secs(1),
            display_wait: Duration::from_millis(2),
            lookahead: None,
            replay_after_finish: true,
        }
    }
}

/// Advances a display position over a [`FrameBufferCache`] on host-provided clock ticks.
///
/// The host calls [`PlaybackDriver::advance`] with the time elapsed since the previous call; that
/// is the only clock entry point. Transitions requested through [`PlaybackDriver::play`] and
/// friends (or a [`PlaybackControl`] handle) are queued and applied at the start of the next tick.
///
/// When the bitmap for the next position is not decoded yet the previous frame stays on screen.
/// Playback waits up to `max_stall` for it, then skips it and records a dropped frame.
pub struct PlaybackDriver {
    cache: Arc<FrameBufferCache>,
    opts: PlaybackOptions,
    state: PlaybackState,
    displayed: Option<(usize, FrameHandle)>,
    /// Seconds spent waiting for `state.current_index`'s bitmap, `None` when not stalled.
    stalled_for: Option<f64>,
    auto_started: bool,
    commands_tx: mpsc::Sender<PlaybackCommand>,
    commands: mpsc::Receiver<PlaybackCommand>,
    surface: Option<Box<dyn RenderSurface>>,
    stats: PlaybackStats,
}

impl std::fmt::Debug for PlaybackDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDriver")
            .field("opts", &self.opts)
            .field("state", &self.state)
            .field("displayed", &self.displayed.as_ref().map(|(i, _)| *i))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl PlaybackDriver {
    /// Create a stopped driver over `cache`.
    pub fn new(cache: Arc<FrameBufferCache>, opts: PlaybackOptions) -> Self {
        let (commands_tx, commands) = mpsc::channel();
        Self {
            cache,
            opts,
            state: PlaybackState::default(),
            displayed: None,
            stalled_for: None,
            auto_started: false,
            commands_tx,
            commands,
            surface: None,
            stats: PlaybackStats::default(),
        }
    }

    /// Attach the render surface that receives every frame change.
    pub fn with_surface(mut self, surface: impl RenderSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Replace (or remove) the render surface.
    pub fn set_surface(&mut self, surface: Option<Box<dyn RenderSurface>>) {
        self.surface = surface;
    }

    /// Handle for queuing commands from other threads.
    pub fn control(&self) -> PlaybackControl {
        PlaybackControl::new(self.commands_tx.clone())
    }

    /// Cache this driver reads from.
    pub fn cache(&self) -> &Arc<FrameBufferCache> {
        &self.cache
    }

    /// Queue `Play`.
    pub fn play(&self) {
        self.enqueue(PlaybackCommand::Play);
    }

    /// Queue `Pause`.
    pub fn pause(&self) {
        self.enqueue(PlaybackCommand::Pause);
    }

    /// Queue `Stop`.
    pub fn stop(&self) {
        self.enqueue(PlaybackCommand::Stop);
    }

    /// Queue a seek to `index`.
    pub fn seek(&self, index: usize) {
        self.enqueue(PlaybackCommand::Seek(index));
    }

    fn enqueue(&self, cmd: PlaybackCommand) {
        // The receiver lives in `self`, so this cannot fail.
        let _ = self.commands_tx.send(cmd);
    }

    /// Position and timing snapshot.
    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    /// State machine state.
    pub fn state(&self) -> PlayState {
        self.state.state
    }

    /// Whether playback is advancing.
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Logical playback position.
    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    /// Bitmap currently on screen, which lags `current_index` while stalled.
    pub fn current_bitmap(&self) -> Option<FrameHandle> {
        self.displayed.as_ref().map(|(_, b)| Arc::clone(b))
    }

    /// Index of the bitmap currently on screen.
    pub fn displayed_index(&self) -> Option<usize> {
        self.displayed.as_ref().map(|(i, _)| *i)
    }

    /// Lifetime counters.
    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// Loop count in effect (0 = forever).
    pub fn loop_count(&self) -> u32 {
        self.opts
            .loop_count_override
            .unwrap_or_else(|| self.cache.decoder().meta().loop_count)
    }

    fn lookahead(&self) -> usize {
        self.opts
            .lookahead
            .unwrap_or_else(|| self.cache.suggested_lookahead())
    }

    fn request_policy(&self) -> RequestPolicy {
        if self.opts.display_wait.is_zero() {
            RequestPolicy::NonBlocking
        } else {
            RequestPolicy::Wait(self.opts.display_wait)
        }
    }

    /// Move the clock forward by `elapsed` seconds.
    ///
    /// Applies queued commands, steps through as many frames as the elapsed time covers, updates
    /// the cache window and presents the bitmap for the new position if it is ready.
    pub fn advance(&mut self, elapsed: f64) -> AdvanceReport {
        let elapsed = if elapsed.is_finite() && elapsed > 0.0 {
            elapsed
        } else {
            0.0
        };
        self.state.last_advance_timestamp += elapsed;
        self.stats.ticks += 1;

        let meta = self.cache.decoder().meta();
        let frame_count = meta.frame_count;
        self.apply_commands(frame_count);

        let mut report = AdvanceReport::default();
        if frame_count == 0 {
            report.current_index = self.state.current_index;
            return report;
        }
        if self.state.current_index >= frame_count {
            self.state.current_index = frame_count - 1;
        }

        if self.opts.auto_play && !self.auto_started && frame_count > 1 {
            self.auto_started = true;
            if self.state.state == PlayState::Stopped {
                self.state.state = PlayState::Playing;
                tracing::debug!(frame_count, "auto play");
            }
        }

        if self.state.state == PlayState::Playing {
            self.step(elapsed, frame_count, meta.finalized, &mut report);
        }

        let current = self.state.current_index;
        self.cache.set_window(current, self.lookahead(), LOOKBEHIND);
        if self.present(current, &mut report) {
            self.stalled_for = None;
        } else if self.state.state == PlayState::Playing && self.stalled_for.is_none() {
            self.stalled_for = Some(0.0);
            self.stats.stalls += 1;
            tracing::trace!(index = current, "bitmap not ready, holding previous frame");
        }

        report.current_index = self.state.current_index;
        report
    }

    fn apply_commands(&mut self, frame_count: usize) {
        while let Ok(cmd) = self.commands.try_recv() {
            tracing::debug!(?cmd, from = ?self.state.state, "playback command");
            match cmd {
                PlaybackCommand::Play => match self.state.state {
                    PlayState::Stopped | PlayState::Paused => {
                        self.state.state = PlayState::Playing;
                    }
                    PlayState::Finished if self.opts.replay_after_finish => {
                        self.state.loops_completed = 0;
                        self.rewind(0);
                        self.state.state = PlayState::Playing;
                    }
                    PlayState::Finished | PlayState::Playing => {}
                },
                PlaybackCommand::Pause => {
                    if self.state.state == PlayState::Playing {
                        self.state.state = PlayState::Paused;
                    }
                }
                PlaybackCommand::Stop => {
                    self.state.state = PlayState::Stopped;
                    self.state.loops_completed = 0;
                    self.rewind(0);
                }
                PlaybackCommand::Seek(index) => {
                    if frame_count > 0 {
                        self.rewind(index.min(frame_count - 1));
                    }
                }
            }
        }
    }

    fn rewind(&mut self, index: usize) {
        self.state.current_index = index;
        self.state.accumulated = 0.0;
        self.stalled_for = None;
    }

    /// Time-driven part of a tick while playing.
    fn step(
        &mut self,
        elapsed: f64,
        frame_count: usize,
        finalized: bool,
        report: &mut AdvanceReport,
    ) {
        if let Some(waited) = self.stalled_for {
            // Still holding the previous frame for `current_index`.
            let waited = waited + elapsed;
            if self.is_ready(self.state.current_index) || waited < self.opts.max_stall.as_secs_f64()
            {
                self.stalled_for = Some(waited);
                return;
            }
            tracing::warn!(
                index = self.state.current_index,
                waited_secs = waited,
                "frame not decoded in time, skipping it"
            );
            report.dropped_frames += 1;
            self.stats.dropped_frames += 1;
            self.stalled_for = None;
            self.state.accumulated = 0.0;
            self.next_index(frame_count, finalized, report);
            return;
        }

        self.state.accumulated += elapsed;
        let max_steps = frame_count.saturating_mul(MAX_PASSES_PER_TICK);
        let mut steps = 0;
        loop {
            let duration = self
                .cache
                .decoder()
                .frame_duration(self.state.current_index)
                .unwrap_or(crate::foundation::core::MIN_FRAME_DURATION_SECS);
            if self.state.accumulated < duration {
                break;
            }
            if self.state.current_index + 1 >= frame_count && !finalized {
                // More frames may still arrive; wait at the edge without dropping anything.
                self.state.accumulated = duration;
                self.stats.streaming_holds += 1;
                break;
            }
            if steps >= max_steps {
                if self.skip_whole_passes(frame_count, report) {
                    steps = 0;
                    continue;
                }
                break;
            }
            steps += 1;
            self.state.accumulated -= duration;
            if !self.next_index(frame_count, finalized, report) {
                break;
            }
        }
    }

    /// Consume the time backlog of an overlong tick. A finite loop count skips whole passes and
    /// finishes if the backlog reaches it; an infinite one drops the backlog. Returns `true` when
    /// stepping should resume with the remainder.
    fn skip_whole_passes(&mut self, frame_count: usize, report: &mut AdvanceReport) -> bool {
        let loop_count = self.loop_count();
        if loop_count == 0 {
            tracing::debug!(
                backlog_secs = self.state.accumulated,
                "tick too long, dropping the time backlog"
            );
            self.state.accumulated = 0.0;
            return false;
        }

        let pass: f64 = {
            let dec = self.cache.decoder();
            (0..frame_count)
                .map(|i| {
                    dec.frame_duration(i)
                        .unwrap_or(crate::foundation::core::MIN_FRAME_DURATION_SECS)
                })
                .sum()
        };
        let passes = (self.state.accumulated / pass).floor();
        let remaining = loop_count.saturating_sub(self.state.loops_completed);
        if passes >= f64::from(remaining) {
            self.state.loops_completed = loop_count;
            self.state.current_index = frame_count - 1;
            self.state.state = PlayState::Finished;
            self.state.accumulated = 0.0;
            report.finished = true;
            tracing::debug!(
                loops = self.state.loops_completed,
                "playback finished within a long tick"
            );
            return false;
        }
        // `passes < remaining <= u32::MAX` here.
        let passes = passes as u32;
        self.state.loops_completed += passes;
        self.state.accumulated -= f64::from(passes) * pass;
        tracing::debug!(passes, "tick too long, skipping whole passes");
        true
    }

    /// Step to the following frame with loop accounting. Returns `false` once finished.
    fn next_index(
        &mut self,
        frame_count: usize,
        finalized: bool,
        report: &mut AdvanceReport,
    ) -> bool {
        let next = self.state.current_index + 1;
        if next < frame_count {
            self.state.current_index = next;
            return true;
        }
        if !finalized {
            return false;
        }

        self.state.loops_completed = self.state.loops_completed.saturating_add(1);
        let loop_count = self.loop_count();
        if loop_count > 0 && self.state.loops_completed >= loop_count {
            self.state.state = PlayState::Finished;
            self.state.accumulated = 0.0;
            report.finished = true;
            tracing::debug!(loops = self.state.loops_completed, "playback finished");
            return false;
        }
        self.state.current_index = 0;
        true
    }

    /// The stalled-on bitmap arrived in the cache (or is being displayed already).
    fn is_ready(&self, index: usize) -> bool {
        self.displayed.as_ref().is_some_and(|(i, _)| *i == index)
            || self.cache.peek(index).is_some()
    }

    /// Hand the bitmap for `index` to the surface unless it is already shown.
    fn present(&mut self, index: usize, report: &mut AdvanceReport) -> bool {
        if self.displayed.as_ref().is_some_and(|(i, _)| *i == index) {
            return true;
        }
        let Some(bitmap) = self.cache.request_frame(index, self.request_policy()) else {
            return false;
        };

        if let Some(surface) = self.surface.as_mut() {
            let meta = self.cache.decoder().meta();
            surface.present(&bitmap, meta.canvas(), meta.scale);
        }
        if self.stalled_for.is_some() {
            // The frame starts its full duration once it is actually visible.
            self.state.accumulated = 0.0;
        }
        self.displayed = Some((index, bitmap));
        self.stats.frames_shown += 1;
        report.frame_changed = true;
        true
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/driver.rs"]
mod tests;
