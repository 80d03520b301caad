//! Assembles APNG and animated WebP files from RGBA frames encoded by the `image` crate.

use image::ImageEncoder;

pub const APNG_DISPOSE_NONE: u8 = 0;
pub const APNG_DISPOSE_BACKGROUND: u8 = 1;
pub const APNG_DISPOSE_PREVIOUS: u8 = 2;

#[derive(Clone, Debug)]
pub struct AnimFrame {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub delay_ms: u16,
    /// APNG dispose_op; WebP only distinguishes background from none.
    pub dispose: u8,
    pub blend_over: bool,
}

impl AnimFrame {
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            rgba: rgba.repeat((width * height) as usize),
            delay_ms: 100,
            dispose: APNG_DISPOSE_NONE,
            blend_over: true,
        }
    }

    pub fn at(mut self, left: u32, top: u32) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u16) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn dispose(mut self, dispose: u8) -> Self {
        self.dispose = dispose;
        self
    }

    pub fn replace(mut self) -> Self {
        self.blend_over = false;
        self
    }
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut crc = crc32fast::Hasher::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
}

/// `(type, data)` of every chunk after the signature.
fn png_chunks(bytes: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
    let mut out = Vec::new();
    let mut pos = 8;
    while pos + 12 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let kind: [u8; 4] = bytes[pos + 4..pos + 8].try_into().unwrap();
        out.push((kind, bytes[pos + 8..pos + 8 + len].to_vec()));
        pos += 12 + len;
    }
    out
}

fn encode_png(frame: &AnimFrame) -> Vec<u8> {
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(
            &frame.rgba,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
    buf
}

/// Encode an APNG. Frame 0 must cover the canvas; `plays: 0` loops forever.
pub fn build_apng(width: u32, height: u32, plays: u32, frames: &[AnimFrame]) -> Vec<u8> {
    let encoded: Vec<_> = frames.iter().map(|f| png_chunks(&encode_png(f))).collect();

    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = encoded[0]
        .iter()
        .find(|(k, _)| k == b"IHDR")
        .unwrap()
        .1
        .clone();
    ihdr[0..4].copy_from_slice(&width.to_be_bytes());
    ihdr[4..8].copy_from_slice(&height.to_be_bytes());
    png_chunk(&mut out, b"IHDR", &ihdr);

    let mut actl = Vec::new();
    actl.extend_from_slice(&(frames.len() as u32).to_be_bytes());
    actl.extend_from_slice(&plays.to_be_bytes());
    png_chunk(&mut out, b"acTL", &actl);

    let mut seq = 0u32;
    for (i, (frame, chunks)) in frames.iter().zip(&encoded).enumerate() {
        let mut fctl = Vec::with_capacity(26);
        fctl.extend_from_slice(&seq.to_be_bytes());
        fctl.extend_from_slice(&frame.width.to_be_bytes());
        fctl.extend_from_slice(&frame.height.to_be_bytes());
        fctl.extend_from_slice(&frame.left.to_be_bytes());
        fctl.extend_from_slice(&frame.top.to_be_bytes());
        fctl.extend_from_slice(&frame.delay_ms.to_be_bytes());
        fctl.extend_from_slice(&1000u16.to_be_bytes());
        fctl.push(frame.dispose);
        fctl.push(u8::from(frame.blend_over));
        png_chunk(&mut out, b"fcTL", &fctl);
        seq += 1;

        for (_, data) in chunks.iter().filter(|(k, _)| k == b"IDAT") {
            if i == 0 {
                png_chunk(&mut out, b"IDAT", data);
            } else {
                let mut fdat = seq.to_be_bytes().to_vec();
                fdat.extend_from_slice(data);
                png_chunk(&mut out, b"fdAT", &fdat);
                seq += 1;
            }
        }
    }
    png_chunk(&mut out, b"IEND", &[]);
    out
}

fn riff_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
}

fn u24_le(v: u32) -> [u8; 3] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}

/// The bitstream chunk(s) of a simple lossless WebP.
fn encode_webp_bitstream(frame: &AnimFrame) -> Vec<u8> {
    let mut buf = Vec::new();
    image::codecs::webp::WebPEncoder::new_lossless(&mut buf)
        .write_image(
            &frame.rgba,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
    buf.split_off(12)
}

/// Encode an animated WebP. Offsets must be even; `loops: 0` loops forever.
pub fn build_animated_webp(width: u32, height: u32, loops: u16, frames: &[AnimFrame]) -> Vec<u8> {
    let mut chunks = Vec::new();

    let mut vp8x = vec![0x12, 0, 0, 0];
    vp8x.extend_from_slice(&u24_le(width - 1));
    vp8x.extend_from_slice(&u24_le(height - 1));
    riff_chunk(&mut chunks, b"VP8X", &vp8x);

    let mut anim = vec![0, 0, 0, 0];
    anim.extend_from_slice(&loops.to_le_bytes());
    riff_chunk(&mut chunks, b"ANIM", &anim);

    for frame in frames {
        assert!(frame.left % 2 == 0 && frame.top % 2 == 0, "odd WebP frame offset");
        let mut anmf = Vec::new();
        anmf.extend_from_slice(&u24_le(frame.left / 2));
        anmf.extend_from_slice(&u24_le(frame.top / 2));
        anmf.extend_from_slice(&u24_le(frame.width - 1));
        anmf.extend_from_slice(&u24_le(frame.height - 1));
        anmf.extend_from_slice(&u24_le(u32::from(frame.delay_ms)));
        let mut flags = 0;
        if frame.dispose == APNG_DISPOSE_BACKGROUND {
            flags |= 0x01;
        }
        if !frame.blend_over {
            flags |= 0x02;
        }
        anmf.push(flags);
        anmf.extend_from_slice(&encode_webp_bitstream(frame));
        riff_chunk(&mut chunks, b"ANMF", &anmf);
    }

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((chunks.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&chunks);
    out
}
