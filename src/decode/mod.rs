//! Incremental decoding and frame composition.

pub(crate) mod compose;
/// Append-only buffer state machine and sequential compositor.
pub mod incremental;
/// Serializable image and frame summaries.
pub mod properties;

pub use incremental::{FrameUnavailable, IncrementalDecoder};
pub use properties::{FrameProperties, ImageProperties};
