use crate::foundation::core::{
    AlphaMode, BlendOperation, BYTES_PER_PIXEL, CanvasSize, DisposeMethod, FrameBitmap, FrameRect,
};
use crate::foundation::math::{over_straight, premultiply_rgba8_in_place};
use crate::source::{FrameRecord, RawFrame};

/// Index of the earliest frame that a replay ending at `target` has to start from.
///
/// A frame is a valid starting point when the canvas it composites onto is known to be fully
/// transparent (the first frame, or the previous frame disposes the whole canvas to background),
/// or when it overwrites the entire canvas and does not ask to restore what was beneath it.
pub(crate) fn blend_start_index(records: &[FrameRecord], target: usize, canvas: CanvasSize) -> usize {
    let target = target.min(records.len().saturating_sub(1));
    for i in (1..=target).rev() {
        let cur = &records[i];
        if cur.rect.covers(canvas)
            && cur.blend == BlendOperation::None
            && cur.dispose != DisposeMethod::Previous
        {
            return i;
        }
        let prev = &records[i - 1];
        if prev.dispose == DisposeMethod::Background && prev.rect.covers(canvas) {
            return i;
        }
    }
    0
}

/// Canvas accumulator for sequential disposal/blend composition.
///
/// Holds the canvas exactly as it looked after compositing frame `last` (its disposal is applied
/// lazily, right before the next frame is composited).
#[derive(Debug)]
pub(crate) struct Compositor {
    canvas: CanvasSize,
    pixels: Vec<u8>,
    last: Option<(usize, FrameRect, DisposeMethod)>,
    /// Canvas before `last` was composited, kept only when `last` disposes to previous.
    restore: Option<Vec<u8>>,
}

impl Compositor {
    pub(crate) fn new(canvas: CanvasSize) -> Self {
        Self {
            canvas,
            pixels: vec![0; canvas.byte_len()],
            last: None,
            restore: None,
        }
    }

    pub(crate) fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub(crate) fn last_index(&self) -> Option<usize> {
        self.last.map(|(i, _, _)| i)
    }

    /// Back to a transparent canvas with nothing composited.
    pub(crate) fn reset(&mut self) {
        self.pixels.fill(0);
        self.last = None;
        self.restore = None;
    }

    /// Composite the next frame in sequence.
    pub(crate) fn composite(&mut self, record: &FrameRecord, raw: &RawFrame) {
        if let Some((_, rect, dispose)) = self.last {
            match dispose {
                DisposeMethod::None => {}
                DisposeMethod::Background => self.clear_rect(rect),
                DisposeMethod::Previous => {
                    if let Some(saved) = self.restore.take() {
                        self.pixels = saved;
                    }
                }
            }
        }

        self.restore = (record.dispose == DisposeMethod::Previous).then(|| self.pixels.clone());
        self.blit(raw, record.blend);
        self.last = Some((record.index, record.rect, record.dispose));
    }

    /// Copy of the current composite in the requested alpha representation.
    pub(crate) fn snapshot(&self, for_display: bool) -> FrameBitmap {
        let mut pixels = self.pixels.clone();
        let alpha = if for_display {
            premultiply_rgba8_in_place(&mut pixels);
            AlphaMode::Premultiplied
        } else {
            AlphaMode::Straight
        };
        FrameBitmap {
            width: self.canvas.width,
            height: self.canvas.height,
            alpha,
            pixels,
        }
    }

    fn row_span(&self, rect: FrameRect, row: u32) -> std::ops::Range<usize> {
        let top = rect.top_row(self.canvas);
        let start = (((top + row) as usize) * (self.canvas.width as usize) + rect.x as usize)
            * BYTES_PER_PIXEL;
        start..start + (rect.width as usize) * BYTES_PER_PIXEL
    }

    fn clear_rect(&mut self, rect: FrameRect) {
        let rect = rect.clipped_to(self.canvas);
        for row in 0..rect.height {
            let span = self.row_span(rect, row);
            self.pixels[span].fill(0);
        }
    }

    fn blit(&mut self, raw: &RawFrame, blend: BlendOperation) {
        let rect = raw.rect.clipped_to(self.canvas);
        let src_stride = (raw.rect.width as usize) * BYTES_PER_PIXEL;
        if src_stride == 0 {
            return;
        }

        // Rows clipped off the top of the canvas come first in the source.
        let skip = raw.rect.height.saturating_sub(rect.height) as usize;
        for (row, src_row) in raw
            .rgba8
            .chunks_exact(src_stride)
            .skip(skip)
            .take(rect.height as usize)
            .enumerate()
        {
            let span = self.row_span(rect, row as u32);
            let dst_row = &mut self.pixels[span];
            let src_row = &src_row[..dst_row.len()];
            match blend {
                BlendOperation::None => dst_row.copy_from_slice(src_row),
                BlendOperation::Over => {
                    for (d, s) in dst_row
                        .chunks_exact_mut(BYTES_PER_PIXEL)
                        .zip(src_row.chunks_exact(BYTES_PER_PIXEL))
                    {
                        let out = over_straight([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
                        d.copy_from_slice(&out);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/compose.rs"]
mod tests;
