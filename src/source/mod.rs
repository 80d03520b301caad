//! Format-specific frame sources.
//!
//! A [`FrameSource`] is the narrow boundary between the engine and an actual codec. It knows how
//! to scan a (possibly incomplete) byte buffer for container structure and how to decode one
//! frame's pixels. Everything stateful (buffering, composition, caching) lives above it.

use std::ops::Range;

use crate::foundation::core::{BlendOperation, CanvasSize, DisposeMethod, FrameMeta, FrameRect};
use crate::foundation::error::{LoopframeError, LoopframeResult};

/// Leading-bytes format detection.
pub mod detect;
/// GIF container scanner and frame decoder.
pub mod gif;
/// Single-frame formats handled by the `image` crate.
pub mod still;
/// APNG chunk scanner; plain PNG falls through to [`still::StillSource`].
pub mod apng;
/// Animated WebP (`ANMF`) scanner; simple WebP falls through to [`still::StillSource`].
pub mod webp;

pub use detect::{ImageType, detect_image_type};

/// One frame located by a container scan.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    /// Zero-based frame index.
    pub index: usize,
    /// Placement within the canvas (already clipped to it), origin bottom-left.
    pub rect: FrameRect,
    /// Normalized display duration in seconds.
    pub duration: f64,
    /// Disposal applied after this frame is shown.
    pub dispose: DisposeMethod,
    /// Blend applied when this frame is composited.
    pub blend: BlendOperation,
    /// Bytes of the buffer holding this frame's encoded data.
    pub byte_range: Range<usize>,
}

impl FrameRecord {
    /// Public metadata view of this record.
    pub fn meta(&self) -> FrameMeta {
        FrameMeta {
            index: self.index,
            width: self.rect.width,
            height: self.rect.height,
            offset_x: self.rect.x,
            offset_y: self.rect.y,
            duration: self.duration,
            dispose: self.dispose,
            blend: self.blend,
        }
    }
}

/// Container-level header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Logical canvas size.
    pub canvas: CanvasSize,
    /// 0 means loop forever.
    pub loop_count: u32,
}

/// Result of scanning a byte buffer as far as it allows.
///
/// `Err(ContainerCorrupt)` from [`FrameSource::parse_container`] is the fatal case; a scan that
/// simply ran out of bytes is returned as `Ok` with whatever was found so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerScan {
    /// `None` until the header is fully received.
    pub header: Option<ContainerHeader>,
    /// Frames whose bytes are fully received, in index order.
    pub frames: Vec<FrameRecord>,
    /// A frame whose header was parsed but whose data is cut short.
    pub partial: Option<FrameRecord>,
    /// The container's end marker was reached; later bytes are ignored.
    pub ended: bool,
}

impl ContainerScan {
    /// Return `true` when more bytes could still change the scan result.
    pub fn is_incomplete(&self) -> bool {
        self.header.is_none() || (!self.ended && self.partial.is_some())
    }
}

/// Pixels of one undecorated frame, sized to its rectangle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Clipped placement rectangle.
    pub rect: FrameRect,
    /// Straight-alpha RGBA8, top row first, `rect.width * rect.height * 4` bytes.
    pub rgba8: Vec<u8>,
}

/// Format-specific decode capability.
///
/// Implementations must be pure with respect to their inputs: the same bytes and record always
/// yield the same result. They are called from background decode threads.
pub trait FrameSource: Send + Sync {
    /// Format handled by this source.
    fn image_type(&self) -> ImageType;

    /// Scan container structure (header, loop count, frame directory) as far as `bytes` allows.
    ///
    /// `is_final` tells the source no further bytes will arrive, which lets it turn a missing
    /// header into a fatal error.
    fn parse_container(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<ContainerScan>;

    /// Decode the pixels of one frame previously located by [`FrameSource::parse_container`].
    ///
    /// `for_display` is a hint; sources that have a cheaper presentation path may use it.
    fn decode_frame(
        &self,
        bytes: &[u8],
        record: &FrameRecord,
        for_display: bool,
    ) -> LoopframeResult<RawFrame>;
}

/// Pick the frame source for a detected image type.
pub fn source_for(ty: ImageType) -> LoopframeResult<Box<dyn FrameSource>> {
    match ty {
        ImageType::Gif => Ok(Box::new(gif::GifSource::new())),
        ImageType::Png => Ok(Box::new(apng::ApngSource::new())),
        ImageType::WebP => Ok(Box::new(webp::WebPSource::new())),
        ImageType::Jpeg
        | ImageType::Bmp
        | ImageType::Tiff
        | ImageType::Ico => Ok(Box::new(still::StillSource::new(ty))),
        other => Err(LoopframeError::unsupported(format!("{other:?}"))),
    }
}

/// Convert a top-left based rectangle into a canvas-clipped bottom-left one.
pub(crate) fn top_left_placement(
    canvas: CanvasSize,
    left: u32,
    top: u32,
    width: u32,
    height: u32,
) -> FrameRect {
    let x = left.min(canvas.width);
    let top = top.min(canvas.height);
    let w = width.min(canvas.width - x);
    let h = height.min(canvas.height - top);
    FrameRect {
        x,
        y: canvas.height - top - h,
        width: w,
        height: h,
    }
}

/// Keep the top-left `rect.width x rect.height` pixels of a decoded `src_width` wide RGBA8 image.
pub(crate) fn crop_to_rect(
    index: usize,
    rgba8: &[u8],
    src_width: u32,
    src_height: u32,
    rect: FrameRect,
) -> LoopframeResult<RawFrame> {
    let (w, h) = (rect.width as usize, rect.height as usize);
    let src_w = src_width as usize;
    if rect.width > src_width || rect.height > src_height || rgba8.len() < src_w * h * 4 {
        return Err(LoopframeError::frame_corrupt(
            index,
            "decoded frame smaller than its placement",
        ));
    }
    if w == src_w {
        return Ok(RawFrame {
            rect,
            rgba8: rgba8[..w * h * 4].to_vec(),
        });
    }
    let mut out = Vec::with_capacity(w * h * 4);
    if w > 0 {
        for row in rgba8.chunks_exact(src_w * 4).take(h) {
            out.extend_from_slice(&row[..w * 4]);
        }
    }
    Ok(RawFrame { rect, rgba8: out })
}

#[cfg(test)]
#[path = "../../tests/unit/source/mod.rs"]
mod tests;
