//! Synthesizes small GIFs with explicit palettes so decoded colors are exact.

use std::borrow::Cow;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Global palette: 0 red, 1 green, 2 blue, 3 white.
pub fn palette() -> Vec<u8> {
    [RED, GREEN, BLUE, WHITE].concat()
}

#[derive(Clone, Debug)]
pub struct FrameSpec {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Palette indices, row-major.
    pub indices: Vec<u8>,
    pub delay_cs: u16,
    pub dispose: gif::DisposalMethod,
    pub transparent: Option<u8>,
}

impl FrameSpec {
    pub fn solid(width: u16, height: u16, index: u8) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices: vec![index; usize::from(width) * usize::from(height)],
            delay_cs: 10,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
        }
    }

    pub fn at(mut self, left: u16, top: u16) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn delay(mut self, delay_cs: u16) -> Self {
        self.delay_cs = delay_cs;
        self
    }

    pub fn dispose(mut self, dispose: gif::DisposalMethod) -> Self {
        self.dispose = dispose;
        self
    }
}

/// Encode a GIF. `repeat: None` omits the NETSCAPE loop extension.
pub fn build_gif(width: u16, height: u16, repeat: Option<gif::Repeat>, frames: &[FrameSpec]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let pal = palette();
        let mut enc = gif::Encoder::new(&mut buf, width, height, &pal).unwrap();
        if let Some(r) = repeat {
            enc.set_repeat(r).unwrap();
        }
        for f in frames {
            let frame = gif::Frame {
                left: f.left,
                top: f.top,
                width: f.width,
                height: f.height,
                delay: f.delay_cs,
                dispose: f.dispose,
                transparent: f.transparent,
                buffer: Cow::Owned(f.indices.clone()),
                ..gif::Frame::default()
            };
            enc.write_frame(&frame).unwrap();
        }
    }
    buf
}

/// Three full-canvas frames: red, green, blue. 100 ms each, loops twice.
pub fn three_color_gif(width: u16, height: u16) -> Vec<u8> {
    build_gif(
        width,
        height,
        Some(gif::Repeat::Finite(2)),
        &[
            FrameSpec::solid(width, height, 0),
            FrameSpec::solid(width, height, 1),
            FrameSpec::solid(width, height, 2),
        ],
    )
}
