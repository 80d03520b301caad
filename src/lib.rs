//! Loopframe decodes, buffers and plays animated images whose bytes may still be arriving.
//!
//! The engine is split in three layers:
//!
//! - [`IncrementalDecoder`] owns the compressed bytes of one image, tracks how much of the
//!   container is parseable and composites frames with their disposal and blend rules
//! - [`FrameBufferCache`] keeps decoded frames within a byte budget, prefetching ahead of playback
//!   on a background worker and evicting frames far from the playhead
//! - [`PlaybackDriver`] advances the playhead on host-provided clock ticks and hands ready frames
//!   to a [`RenderSurface`]
//!
//! [`AnimatedImage`] ties them together and builds players from a [`PlayerConfig`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Animated image facade.
pub mod animated;
/// Frame cache and memory budget.
pub mod cache;
/// Player configuration.
pub mod config;
/// Incremental decoder and frame composition.
pub mod decode;
/// Playback state machine.
pub mod playback;
/// Format detection and per-format frame sources.
pub mod source;

pub use crate::foundation::core::{
    AlphaMode, AnimatedImageMeta, BlendOperation, CanvasSize, DisposeMethod, FrameBitmap,
    FrameHandle, FrameMeta, FrameRect, MIN_FRAME_DURATION_SECS, normalize_frame_duration,
};
pub use crate::foundation::error::{LoopframeError, LoopframeResult};

pub use crate::animated::AnimatedImage;
pub use crate::cache::{BufferBudget, CacheStats, FrameBufferCache, RequestPolicy};
pub use crate::config::PlayerConfig;
pub use crate::decode::{FrameProperties, ImageProperties, IncrementalDecoder};
pub use crate::playback::{
    AdvanceReport, PlayState, PlaybackControl, PlaybackDriver, PlaybackOptions, PlaybackState,
    PlaybackStats, RenderSurface,
};
pub use crate::source::{FrameSource, ImageType, detect_image_type};

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
mod test_support;
