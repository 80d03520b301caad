use crate::foundation::core::{CanvasSize, FrameBitmap};

/// Receiver of displayable frames.
///
/// Called from the thread that drives `advance`, once per frame change.
pub trait RenderSurface: Send {
    /// Show `bitmap` (premultiplied, canvas-sized) at the given display scale.
    fn present(&mut self, bitmap: &FrameBitmap, canvas: CanvasSize, scale: f64);
}

impl<F> RenderSurface for F
where
    F: FnMut(&FrameBitmap, CanvasSize, f64) + Send,
{
    fn present(&mut self, bitmap: &FrameBitmap, canvas: CanvasSize, scale: f64) {
        self(bitmap, canvas, scale);
    }
}
