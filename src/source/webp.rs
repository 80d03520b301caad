use anyhow::Context;

use crate::foundation::core::{
    BlendOperation, CanvasSize, DisposeMethod, FrameRect, normalize_frame_duration,
};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::source::still::StillSource;
use crate::source::{
    ContainerHeader, ContainerScan, FrameRecord, FrameSource, ImageType, RawFrame, crop_to_rect,
    top_left_placement,
};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const VP8X_LEN: usize = 10;
/// Offsets, size, duration and flags at the start of an `ANMF` payload.
const ANMF_HEADER_LEN: usize = 16;

const VP8X_ANIMATION: u8 = 0x02;
const VP8X_ALPHA: u8 = 0x10;
const ANMF_DISPOSE_BACKGROUND: u8 = 0x01;
const ANMF_NO_BLEND: u8 = 0x02;

/// WebP source for the extended (`VP8X`) animation format.
///
/// `ANMF` chunks are scanned as they arrive and each becomes a frame once fully received. Simple
/// and non-animated extended files go to [`StillSource`]. A frame is decoded by wrapping its
/// bitstream chunks in a standalone WebP container.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebPSource;

impl WebPSource {
    /// Create a WebP source.
    pub fn new() -> Self {
        Self
    }

    fn still(&self) -> StillSource {
        StillSource::new(ImageType::WebP)
    }
}

#[derive(Clone, Copy, Debug)]
struct Chunk {
    start: usize,
    fourcc: [u8; 4],
    size: usize,
}

impl Chunk {
    fn data_start(self) -> usize {
        self.start + CHUNK_HEADER_LEN
    }

    /// End including the pad byte of odd-sized chunks.
    fn end(self) -> usize {
        self.data_start() + self.size + (self.size & 1)
    }
}

fn read_u24_le(bytes: &[u8], at: usize) -> u32 {
    u32::from(bytes[at]) | (u32::from(bytes[at + 1]) << 8) | (u32::from(bytes[at + 2]) << 16)
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn chunk_at(bytes: &[u8], pos: usize) -> Option<Chunk> {
    let head = bytes.get(pos..pos + CHUNK_HEADER_LEN)?;
    Some(Chunk {
        start: pos,
        fourcc: [head[0], head[1], head[2], head[3]],
        size: read_u32_le(head, 4) as usize,
    })
}

fn check_signature(bytes: &[u8]) -> LoopframeResult<()> {
    // Bytes 4..8 hold the RIFF size.
    let expected = b"RIFF\0\0\0\0WEBP";
    let ok = bytes
        .iter()
        .zip(expected)
        .enumerate()
        .all(|(i, (got, want))| (4..8).contains(&i) || got == want);
    if ok {
        Ok(())
    } else {
        Err(LoopframeError::container_corrupt("missing RIFF WEBP signature"))
    }
}

fn frame_from_anmf(index: usize, canvas: CanvasSize, chunk: Chunk, head: &[u8]) -> FrameRecord {
    let left = read_u24_le(head, 0) * 2;
    let top = read_u24_le(head, 3) * 2;
    let width = read_u24_le(head, 6) + 1;
    let height = read_u24_le(head, 9) + 1;
    let duration_ms = read_u24_le(head, 12);
    let flags = head[15];
    FrameRecord {
        index,
        rect: top_left_placement(canvas, left, top, width, height),
        duration: normalize_frame_duration(f64::from(duration_ms) / 1000.0),
        dispose: if flags & ANMF_DISPOSE_BACKGROUND != 0 {
            DisposeMethod::Background
        } else {
            DisposeMethod::None
        },
        blend: if flags & ANMF_NO_BLEND != 0 {
            BlendOperation::None
        } else {
            BlendOperation::Over
        },
        byte_range: chunk.start..chunk.end(),
    }
}

impl FrameSource for WebPSource {
    fn image_type(&self) -> ImageType {
        ImageType::WebP
    }

    #[tracing::instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    fn parse_container(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<ContainerScan> {
        check_signature(bytes)?;
        let Some(first) = chunk_at(bytes, RIFF_HEADER_LEN) else {
            return Ok(ContainerScan::default());
        };
        if &first.fourcc != b"VP8X" {
            return self.still().parse_container(bytes, is_final);
        }
        let Some(vp8x) = bytes.get(first.data_start()..first.data_start() + VP8X_LEN) else {
            return Ok(ContainerScan::default());
        };
        if vp8x[0] & VP8X_ANIMATION == 0 {
            return self.still().parse_container(bytes, is_final);
        }
        let canvas = CanvasSize::new(read_u24_le(vp8x, 4) + 1, read_u24_le(vp8x, 7) + 1);
        let riff_end = (read_u32_le(bytes, 4) as usize).saturating_add(CHUNK_HEADER_LEN);

        let mut scan = ContainerScan::default();
        let mut loop_count = 0u32;
        let mut pos = first.end();
        while pos < riff_end {
            let Some(chunk) = chunk_at(bytes, pos) else {
                break;
            };
            let complete = bytes.len() >= chunk.data_start() + chunk.size;
            match &chunk.fourcc {
                b"ANIM" if complete && chunk.size >= 6 => {
                    let data = &bytes[chunk.data_start()..];
                    loop_count = u32::from(u16::from_le_bytes([data[4], data[5]]));
                }
                b"ANMF" => {
                    let index = scan.frames.len();
                    let head = bytes.get(chunk.data_start()..chunk.data_start() + ANMF_HEADER_LEN);
                    if complete {
                        let head = head.ok_or_else(|| {
                            LoopframeError::container_corrupt(format!(
                                "ANMF chunk at offset {pos} is {} bytes",
                                chunk.size
                            ))
                        })?;
                        let mut record = frame_from_anmf(index, canvas, chunk, head);
                        record.byte_range.end = record.byte_range.end.min(bytes.len());
                        scan.frames.push(record);
                    } else {
                        let mut record = match head {
                            Some(head) => frame_from_anmf(index, canvas, chunk, head),
                            None if is_final => FrameRecord {
                                index,
                                rect: FrameRect::default(),
                                duration: normalize_frame_duration(0.0),
                                dispose: DisposeMethod::None,
                                blend: BlendOperation::Over,
                                byte_range: chunk.start..chunk.start,
                            },
                            None => break,
                        };
                        record.byte_range.end = bytes.len();
                        scan.partial = Some(record);
                        break;
                    }
                }
                _ if !complete => break,
                _ => {}
            }
            pos = chunk.end();
        }
        scan.ended = pos >= riff_end;

        scan.header = Some(ContainerHeader { canvas, loop_count });
        Ok(scan)
    }

    #[tracing::instrument(level = "trace", skip(self, bytes, record), fields(index = record.index))]
    fn decode_frame(
        &self,
        bytes: &[u8],
        record: &FrameRecord,
        for_display: bool,
    ) -> LoopframeResult<RawFrame> {
        let corrupt = |reason: &str| LoopframeError::frame_corrupt(record.index, reason);

        let Some(anmf) = chunk_at(bytes, record.byte_range.start).filter(|c| &c.fourcc == b"ANMF")
        else {
            return self.still().decode_frame(bytes, record, for_display);
        };
        let payload_end = anmf.data_start() + anmf.size;
        if payload_end > bytes.len() || anmf.size < ANMF_HEADER_LEN + CHUNK_HEADER_LEN {
            return Err(corrupt("frame data truncated"));
        }
        let head = &bytes[anmf.data_start()..anmf.data_start() + ANMF_HEADER_LEN];
        let width = read_u24_le(head, 6) + 1;
        let height = read_u24_le(head, 9) + 1;
        let payload = &bytes[anmf.data_start() + ANMF_HEADER_LEN..payload_end];

        // Alpha in a separate ALPH chunk needs the extended header to be honoured.
        let mut body = Vec::with_capacity(payload.len() + CHUNK_HEADER_LEN + VP8X_LEN);
        if payload.starts_with(b"ALPH") {
            let mut vp8x = [0u8; VP8X_LEN];
            vp8x[0] = VP8X_ALPHA;
            vp8x[4..7].copy_from_slice(&(width - 1).to_le_bytes()[..3]);
            vp8x[7..10].copy_from_slice(&(height - 1).to_le_bytes()[..3]);
            body.extend_from_slice(b"VP8X");
            body.extend_from_slice(&(VP8X_LEN as u32).to_le_bytes());
            body.extend_from_slice(&vp8x);
        }
        body.extend_from_slice(payload);

        let mut webp = Vec::with_capacity(RIFF_HEADER_LEN + body.len());
        webp.extend_from_slice(b"RIFF");
        webp.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        webp.extend_from_slice(b"WEBP");
        webp.extend_from_slice(&body);

        let decoded = image::load_from_memory_with_format(&webp, image::ImageFormat::WebP)
            .context("decode WebP animation frame")
            .map_err(|e| LoopframeError::frame_corrupt(record.index, format!("{e:#}")))?
            .to_rgba8();
        let (w, h) = decoded.dimensions();
        if (w, h) != (width, height) {
            return Err(corrupt("frame bitstream size differs from ANMF"));
        }
        crop_to_rect(record.index, decoded.as_raw(), w, h, record.rect)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/webp.rs"]
mod tests;
