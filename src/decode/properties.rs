use crate::foundation::core::{CanvasSize, FrameMeta};
use crate::source::{FrameRecord, ImageType};

/// Per-frame details for re-encoders and inspection tools.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameProperties {
    /// Placement, timing, disposal and blend.
    #[serde(flatten)]
    pub meta: FrameMeta,
    /// Size of the frame's encoded data within the buffer.
    pub encoded_len: usize,
    /// The buffer was finalized before this frame's bytes were complete.
    pub truncated: bool,
}

impl FrameProperties {
    pub(crate) fn from_record(record: &FrameRecord, truncated: bool) -> Self {
        Self {
            meta: record.meta(),
            encoded_len: record.byte_range.len(),
            truncated,
        }
    }
}

/// Image-level summary as currently known to the decoder.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageProperties {
    /// Detected container format.
    pub image_type: ImageType,
    /// Logical canvas size, zero until the header is parsed.
    pub canvas: CanvasSize,
    /// Frames currently exposed.
    pub frame_count: usize,
    /// 0 means loop forever.
    pub loop_count: u32,
    /// Display scale factor.
    pub scale: f64,
    /// Whether the buffer is complete.
    pub finalized: bool,
    /// One entry per exposed frame, in index order.
    pub frames: Vec<FrameProperties>,
}

impl ImageProperties {
    /// Sum of all frame durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|f| f.meta.duration).sum()
    }
}
