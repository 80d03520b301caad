use std::sync::Arc;

/// Bytes per decoded pixel (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Display duration used for frames whose stored delay is zero, absent or implausibly small.
pub const MIN_FRAME_DURATION_SECS: f64 = 0.1;

/// Delays below this are treated as "unspecified" and coerced to [`MIN_FRAME_DURATION_SECS`].
const DURATION_COERCE_BELOW_SECS: f64 = 0.011;

/// Coerce a raw frame delay into a display duration that cannot cause runaway playback.
pub fn normalize_frame_duration(secs: f64) -> f64 {
    if !secs.is_finite() || secs < DURATION_COERCE_BELOW_SECS {
        MIN_FRAME_DURATION_SECS
    } else {
        secs
    }
}

/// Fixed logical drawing surface every frame composites onto.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CanvasSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CanvasSize {
    /// Create a canvas size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels, saturating on overflow.
    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Uncompressed RGBA8 size of one canvas-sized bitmap.
    pub fn byte_len(self) -> usize {
        self.pixel_count().saturating_mul(BYTES_PER_PIXEL)
    }

    /// Return `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What happens to a frame's region after it was shown and before the next frame composites.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DisposeMethod {
    /// Leave the canvas as-is.
    #[default]
    None,
    /// Clear the frame's rectangle to transparent.
    Background,
    /// Restore the canvas to its state before the frame was composited.
    Previous,
}

/// How a frame's pixels combine with existing canvas content.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BlendOperation {
    /// Overwrite the rectangle, alpha included.
    #[default]
    None,
    /// Alpha-composite the frame over the canvas.
    Over,
}

/// Placement of a frame inside the canvas. `y` is measured from the bottom edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameRect {
    /// Left edge.
    pub x: u32,
    /// Bottom edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameRect {
    /// Rectangle covering the whole canvas.
    pub fn full(canvas: CanvasSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: canvas.width,
            height: canvas.height,
        }
    }

    /// Return `true` when the rectangle lies entirely inside the canvas.
    pub fn fits(self, canvas: CanvasSize) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(canvas.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(canvas.height)
    }

    /// Return `true` when the rectangle is exactly the canvas.
    pub fn covers(self, canvas: CanvasSize) -> bool {
        self.x == 0 && self.y == 0 && self.width == canvas.width && self.height == canvas.height
    }

    /// Row index (top-left raster addressing) of the rectangle's first row.
    pub fn top_row(self, canvas: CanvasSize) -> u32 {
        canvas.height.saturating_sub(self.y.saturating_add(self.height))
    }

    /// Clamp to the canvas so the placement invariant holds.
    pub fn clipped_to(self, canvas: CanvasSize) -> Self {
        let x = self.x.min(canvas.width);
        let y = self.y.min(canvas.height);
        Self {
            x,
            y,
            width: self.width.min(canvas.width - x),
            height: self.height.min(canvas.height - y),
        }
    }
}

/// Per-frame metadata, available as soon as the frame's bytes are fully received.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameMeta {
    /// Zero-based frame index.
    pub index: usize,
    /// Frame rectangle width.
    pub width: u32,
    /// Frame rectangle height.
    pub height: u32,
    /// Horizontal placement within the canvas.
    pub offset_x: u32,
    /// Vertical placement within the canvas, origin bottom-left.
    pub offset_y: u32,
    /// Display duration in seconds, always > 0.
    pub duration: f64,
    /// Disposal applied after this frame is shown.
    pub dispose: DisposeMethod,
    /// Blend applied when this frame is composited.
    pub blend: BlendOperation,
}

impl FrameMeta {
    /// Placement rectangle.
    pub fn rect(&self) -> FrameRect {
        FrameRect {
            x: self.offset_x,
            y: self.offset_y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Container-level description of an animated image.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimatedImageMeta {
    /// Canvas width, 0 until the header is parsed.
    pub canvas_width: u32,
    /// Canvas height, 0 until the header is parsed.
    pub canvas_height: u32,
    /// Frames whose bytes are fully available (plus a truncated trailing frame once finalized).
    pub frame_count: usize,
    /// 0 means loop forever.
    pub loop_count: u32,
    /// Display scale factor.
    pub scale: f64,
    /// No more bytes will arrive.
    pub finalized: bool,
}

impl AnimatedImageMeta {
    /// Metadata before any header was parsed.
    pub fn empty(scale: f64) -> Self {
        Self {
            canvas_width: 0,
            canvas_height: 0,
            frame_count: 0,
            loop_count: 0,
            scale,
            finalized: false,
        }
    }

    /// Canvas dimensions.
    pub fn canvas(&self) -> CanvasSize {
        CanvasSize::new(self.canvas_width, self.canvas_height)
    }
}

/// Alpha representation of a bitmap's color channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMode {
    /// r,g,b already multiplied by a (display path).
    Premultiplied,
    /// Original encoding (re-encode path).
    Straight,
}

/// Fully composited, canvas-sized RGBA8 bitmap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBitmap {
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    /// Alpha representation of `pixels`.
    pub alpha: AlphaMode,
    /// Row-major, tightly packed, top row first.
    pub pixels: Vec<u8>,
}

impl FrameBitmap {
    /// Bitmap dimensions.
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }

    /// Approximate memory cost used for cache accounting.
    pub fn byte_cost(&self) -> usize {
        self.size().byte_len()
    }

    /// RGBA of the pixel at column `x`, row `y` (top-left addressing).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * BYTES_PER_PIXEL;
        let px = self.pixels.get(i..i + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Shared, immutable handle to a decoded frame.
///
/// The cache hands these out so eviction can never invalidate a bitmap a consumer still holds.
pub type FrameHandle = Arc<FrameBitmap>;

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
