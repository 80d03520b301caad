/// Playback state machine states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    /// Initial state; positioned at frame 0.
    #[default]
    Stopped,
    /// Advancing on every tick.
    Playing,
    /// Holding the current frame.
    Paused,
    /// Loop count exhausted; holding the last frame.
    Finished,
}

/// Driver-owned position and timing.
///
/// Only [`crate::PlaybackDriver::advance`] mutates it.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaybackState {
    /// Logical playback position.
    pub current_index: usize,
    /// State machine state.
    pub state: PlayState,
    /// Completed passes over all frames.
    pub loops_completed: u32,
    /// Seconds spent on the current frame so far.
    pub accumulated: f64,
    /// Host clock value (sum of all elapsed time passed to `advance`) at the last tick.
    pub last_advance_timestamp: f64,
}

impl PlaybackState {
    /// Whether the state is [`PlayState::Playing`].
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }
}

/// What one call to `advance` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// A different bitmap was handed to the render surface.
    pub frame_changed: bool,
    /// Frames skipped because their bitmap did not arrive within the stall limit.
    pub dropped_frames: u32,
    /// Playback transitioned to [`PlayState::Finished`] during this tick.
    pub finished: bool,
    /// Position after the tick.
    pub current_index: usize,
}

/// Counters accumulated over the driver's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlaybackStats {
    /// Ticks processed.
    pub ticks: u64,
    /// Bitmaps presented.
    pub frames_shown: u64,
    /// Stall force-advances.
    pub dropped_frames: u64,
    /// Times playback had to hold because the next bitmap was not ready.
    pub stalls: u64,
    /// Ticks spent waiting at the end of a still-streaming buffer.
    pub streaming_holds: u64,
}
