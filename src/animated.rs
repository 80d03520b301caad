use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::cache::{BufferBudget, FrameBufferCache};
use crate::config::PlayerConfig;
use crate::decode::{ImageProperties, IncrementalDecoder};
use crate::foundation::core::{AnimatedImageMeta, FrameBitmap, FrameRect};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::playback::{PlaybackDriver, PlaybackOptions};
use crate::source::FrameSource;

/// An animated image: one decoder plus the knobs used to build players over it.
///
/// Cheap to share; players built from the same image share its decoder (and therefore its byte
/// buffer), while each player owns its own frame cache.
#[derive(Debug, Clone)]
pub struct AnimatedImage {
    decoder: Arc<IncrementalDecoder>,
    preload_all_frames: bool,
}

impl AnimatedImage {
    /// Image fed incrementally through [`AnimatedImage::update_data`].
    pub fn streaming(scale: f64) -> LoopframeResult<Self> {
        validate_scale(scale)?;
        Ok(Self::wrap(IncrementalDecoder::new(scale)))
    }

    /// Image over a complete in-memory buffer at scale 1.
    pub fn from_bytes(bytes: &[u8]) -> LoopframeResult<Self> {
        Ok(Self::wrap(IncrementalDecoder::from_bytes(bytes, 1.0)?))
    }

    /// Image read from a file at scale 1.
    pub fn from_path(path: impl AsRef<Path>) -> LoopframeResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    /// Streaming image decoded by an explicit frame source.
    pub fn with_source(source: Arc<dyn FrameSource>, scale: f64) -> LoopframeResult<Self> {
        validate_scale(scale)?;
        Ok(Self::wrap(IncrementalDecoder::with_source(source, scale)))
    }

    fn wrap(decoder: IncrementalDecoder) -> Self {
        Self {
            decoder: Arc::new(decoder),
            preload_all_frames: false,
        }
    }

    /// Set the display scale (points per pixel, e.g. 2 for @2x assets).
    pub fn with_scale(self, scale: f64) -> LoopframeResult<Self> {
        validate_scale(scale)?;
        self.decoder.set_scale(scale);
        Ok(self)
    }

    /// Feed more bytes; see [`IncrementalDecoder::update_data`].
    pub fn update_data(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<()> {
        self.decoder.update_data(bytes, is_final)
    }

    /// Underlying decoder.
    pub fn decoder(&self) -> &Arc<IncrementalDecoder> {
        &self.decoder
    }

    /// Container metadata.
    pub fn meta(&self) -> AnimatedImageMeta {
        self.decoder.meta()
    }

    /// Number of frames currently known.
    pub fn frame_count(&self) -> usize {
        self.decoder.frame_count()
    }

    /// Serializable summary.
    pub fn properties(&self) -> ImageProperties {
        self.decoder.image_properties()
    }

    /// Decoded size of one canvas-sized bitmap.
    pub fn bytes_per_frame(&self) -> usize {
        self.meta().canvas().byte_len()
    }

    /// Decoded size of every frame held at once.
    pub fn animated_image_memory_size(&self) -> usize {
        self.bytes_per_frame().saturating_mul(self.frame_count())
    }

    /// Whether players built from this image keep every frame.
    pub fn preload_all_frames(&self) -> bool {
        self.preload_all_frames
    }

    /// Force players built from now on to decode and keep every frame.
    pub fn set_preload_all_frames(&mut self, preload: bool) {
        self.preload_all_frames = preload;
    }

    /// Region of the canvas frame `index` draws into (origin bottom-left).
    pub fn content_rect(&self, index: usize) -> Option<FrameRect> {
        self.decoder.frame_meta(index).map(|m| m.rect())
    }

    /// Composited, premultiplied bitmap for frame `index`.
    pub fn frame(&self, index: usize) -> Option<FrameBitmap> {
        self.decoder.decode_frame(index, true)
    }

    /// Composited straight-alpha bitmap for frame `index`, as a re-encoder wants it.
    pub fn frame_for_encoding(&self, index: usize) -> Option<FrameBitmap> {
        self.decoder.decode_frame(index, false)
    }

    /// Build a frame cache and playback driver configured by `config`.
    pub fn player(&self, config: &PlayerConfig) -> LoopframeResult<PlaybackDriver> {
        config.validate()?;
        let budget = if self.preload_all_frames {
            BufferBudget::Unbounded
        } else {
            config.budget()
        };
        tracing::debug!(
            ?budget,
            affinity = %config.run_loop_affinity,
            frames = self.frame_count(),
            "building player"
        );
        let cache = FrameBufferCache::new(Arc::clone(&self.decoder), budget)?;
        Ok(PlaybackDriver::new(
            Arc::new(cache),
            PlaybackOptions::from(config),
        ))
    }
}

fn validate_scale(scale: f64) -> LoopframeResult<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(LoopframeError::validation(format!(
            "scale must be finite and > 0, got {scale}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/animated.rs"]
mod tests;
