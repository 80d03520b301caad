/// Convenience result type used across loopframe.
pub type LoopframeResult<T> = Result<T, LoopframeError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Only failures that make an image unusable, or that come from API misuse, are surfaced through
/// this type. Per-frame trouble (truncated or damaged frames, slow decodes) is absorbed by the
/// cache and the playback driver.
#[derive(thiserror::Error, Debug)]
pub enum LoopframeError {
    /// Invalid caller-provided configuration or arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// The container structure is malformed; no frames can be derived from it.
    #[error("container corrupt: {0}")]
    ContainerCorrupt(String),

    /// A single frame could not be decoded.
    #[error("frame {index} corrupt: {reason}")]
    FrameCorrupt {
        /// Zero-based frame index.
        index: usize,
        /// Codec-provided description of the failure.
        reason: String,
    },

    /// `update_data` was called after the buffer was finalized.
    #[error("decode buffer is finalized")]
    Finalized,

    /// The bytes belong to a format no frame source handles.
    #[error("unsupported image format: {0}")]
    Unsupported(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoopframeError {
    /// Build a [`LoopframeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LoopframeError::ContainerCorrupt`] value.
    pub fn container_corrupt(msg: impl Into<String>) -> Self {
        Self::ContainerCorrupt(msg.into())
    }

    /// Build a [`LoopframeError::FrameCorrupt`] value.
    pub fn frame_corrupt(index: usize, reason: impl Into<String>) -> Self {
        Self::FrameCorrupt {
            index,
            reason: reason.into(),
        }
    }

    /// Build a [`LoopframeError::Unsupported`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether the error makes the whole image unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContainerCorrupt(_) | Self::Unsupported(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
