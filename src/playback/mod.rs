//! Clock-driven playback over a frame cache.

/// Cross-thread command handle.
pub mod control;
/// The tick-driven playback state machine.
pub mod driver;
/// Playback state, reports and counters.
pub mod state;
/// Render callback boundary.
pub mod surface;

pub use control::{PlaybackCommand, PlaybackControl};
pub use driver::{PlaybackDriver, PlaybackOptions};
pub use state::{AdvanceReport, PlayState, PlaybackState, PlaybackStats};
pub use surface::RenderSurface;
