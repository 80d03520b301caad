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

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
/// Length, type and CRC around each chunk's data.
const CHUNK_OVERHEAD: usize = 12;
const IHDR_LEN: usize = 13;
const FCTL_LEN: usize = 26;

/// Chunks copied from the file header into each rebuilt single-frame PNG.
const CARRIED_CHUNKS: [&[u8; 4]; 7] = [
    b"PLTE", b"tRNS", b"gAMA", b"cHRM", b"sRGB", b"iCCP", b"sBIT",
];

/// PNG source that understands the APNG extension.
///
/// Chunks are scanned as they arrive; an `fcTL` opens a frame and the frame becomes visible once a
/// chunk other than `IDAT`/`fdAT` follows its data. Files without `acTL` are plain PNG and are
/// handed to [`StillSource`]. Each animation frame is decoded by rebuilding a standalone PNG from
/// the header chunks and that frame's data.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApngSource;

impl ApngSource {
    /// Create a PNG/APNG source.
    pub fn new() -> Self {
        Self
    }

    fn still(&self) -> StillSource {
        StillSource::new(ImageType::Png)
    }
}

#[derive(Clone, Copy, Debug)]
struct ChunkHeader {
    start: usize,
    kind: [u8; 4],
    data_len: usize,
}

impl ChunkHeader {
    fn data_start(self) -> usize {
        self.start + 8
    }

    fn end(self) -> usize {
        self.start + CHUNK_OVERHEAD + self.data_len
    }
}

fn read_u32_be(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u16_be(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Chunk header at `pos`, or `None` while its eight header bytes are not all received.
fn chunk_header(bytes: &[u8], pos: usize) -> Option<ChunkHeader> {
    let head = bytes.get(pos..pos + 8)?;
    Some(ChunkHeader {
        start: pos,
        kind: [head[4], head[5], head[6], head[7]],
        data_len: read_u32_be(head, 0) as usize,
    })
}

/// Data of a fully received chunk.
fn chunk_data(bytes: &[u8], chunk: ChunkHeader) -> Option<&[u8]> {
    if bytes.len() < chunk.end() {
        return None;
    }
    Some(&bytes[chunk.data_start()..chunk.data_start() + chunk.data_len])
}

fn check_signature(bytes: &[u8]) -> LoopframeResult<()> {
    let n = bytes.len().min(SIGNATURE.len());
    if bytes[..n] == SIGNATURE[..n] {
        Ok(())
    } else {
        Err(LoopframeError::container_corrupt("missing PNG signature"))
    }
}

fn frame_from_fctl(index: usize, canvas: CanvasSize, start: usize, fctl: &[u8]) -> FrameRecord {
    let width = read_u32_be(fctl, 4);
    let height = read_u32_be(fctl, 8);
    let left = read_u32_be(fctl, 12);
    let top = read_u32_be(fctl, 16);
    let num = read_u16_be(fctl, 20);
    let den = match read_u16_be(fctl, 22) {
        0 => 100,
        d => d,
    };
    FrameRecord {
        index,
        rect: top_left_placement(canvas, left, top, width, height),
        duration: normalize_frame_duration(f64::from(num) / f64::from(den)),
        // A first frame asking to restore "previous" has nothing to restore but the cleared canvas.
        dispose: match fctl[24] {
            1 => DisposeMethod::Background,
            2 if index == 0 => DisposeMethod::Background,
            2 => DisposeMethod::Previous,
            _ => DisposeMethod::None,
        },
        blend: if fctl[25] == 0 {
            BlendOperation::None
        } else {
            BlendOperation::Over
        },
        byte_range: start..start,
    }
}

/// A frame opened by `fcTL` whose data is still being collected.
struct OpenFrame {
    record: FrameRecord,
    data_end: Option<usize>,
}

impl FrameSource for ApngSource {
    fn image_type(&self) -> ImageType {
        ImageType::Png
    }

    #[tracing::instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    fn parse_container(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<ContainerScan> {
        check_signature(bytes)?;
        let Some(ihdr) = chunk_header(bytes, SIGNATURE.len()) else {
            return Ok(ContainerScan::default());
        };
        if &ihdr.kind != b"IHDR" || ihdr.data_len != IHDR_LEN {
            return Err(LoopframeError::container_corrupt("PNG does not start with IHDR"));
        }
        let Some(data) = chunk_data(bytes, ihdr) else {
            return Ok(ContainerScan::default());
        };
        let canvas = CanvasSize::new(read_u32_be(data, 0), read_u32_be(data, 4));
        if canvas.is_empty() {
            return Err(LoopframeError::container_corrupt(format!(
                "PNG image is {}x{}",
                canvas.width, canvas.height
            )));
        }

        let mut scan = ContainerScan::default();
        let mut loop_count = None;
        let mut open: Option<OpenFrame> = None;
        let mut pos = ihdr.end();
        let mut clean_end = false;

        let close = |open: &mut Option<OpenFrame>, scan: &mut ContainerScan| {
            if let Some(OpenFrame {
                mut record,
                data_end: Some(end),
            }) = open.take()
            {
                record.byte_range.end = end;
                scan.frames.push(record);
            }
        };

        loop {
            if pos == bytes.len() {
                clean_end = true;
                break;
            }
            let Some(chunk) = chunk_header(bytes, pos) else {
                break;
            };
            let is_data = matches!(&chunk.kind, b"IDAT" | b"fdAT");
            if !is_data {
                close(&mut open, &mut scan);
            }

            match &chunk.kind {
                b"IDAT" if loop_count.is_none() => {
                    // No acTL before the image data: this is a plain PNG.
                    return self.still().parse_container(bytes, is_final);
                }
                b"IEND" => {
                    scan.ended = true;
                    break;
                }
                _ => {}
            }

            let Some(data) = chunk_data(bytes, chunk) else {
                if is_final && &chunk.kind == b"fcTL" {
                    let mut record = FrameRecord {
                        index: scan.frames.len(),
                        rect: FrameRect::default(),
                        duration: normalize_frame_duration(0.0),
                        dispose: DisposeMethod::None,
                        blend: BlendOperation::Over,
                        byte_range: chunk.start..bytes.len(),
                    };
                    let prefix = bytes.get(chunk.data_start()..).filter(|p| p.len() >= 20);
                    if let Some(prefix) = prefix {
                        let (w, h) = (read_u32_be(prefix, 4), read_u32_be(prefix, 8));
                        let (x, y) = (read_u32_be(prefix, 12), read_u32_be(prefix, 16));
                        record.rect = top_left_placement(canvas, x, y, w, h);
                    }
                    scan.partial = Some(record);
                }
                break;
            };

            match &chunk.kind {
                b"acTL" if data.len() >= 8 => {
                    loop_count = Some(read_u32_be(data, 4));
                }
                b"fcTL" if data.len() >= FCTL_LEN => {
                    let record = frame_from_fctl(scan.frames.len(), canvas, chunk.start, data);
                    open = Some(OpenFrame {
                        record,
                        data_end: None,
                    });
                }
                b"fcTL" => {
                    return Err(LoopframeError::container_corrupt(format!(
                        "fcTL chunk at offset {pos} is {} bytes",
                        data.len()
                    )));
                }
                b"IDAT" | b"fdAT" => {
                    if let Some(frame) = open.as_mut() {
                        frame.data_end = Some(chunk.end());
                    }
                }
                _ => {}
            }
            pos = chunk.end();
        }

        if let Some(frame) = open.take() {
            match frame.data_end {
                Some(end) if clean_end && is_final => {
                    let mut record = frame.record;
                    record.byte_range.end = end;
                    scan.frames.push(record);
                }
                _ => {
                    let mut record = frame.record;
                    record.byte_range.end = bytes.len();
                    scan.partial = Some(record);
                }
            }
        }

        if loop_count.is_none() && is_final && scan.frames.is_empty() {
            // Header only, never reached any image data.
            return self.still().parse_container(bytes, is_final);
        }

        scan.header = Some(ContainerHeader {
            canvas,
            loop_count: loop_count.unwrap_or(0),
        });
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

        let opens_with_fctl = chunk_header(bytes, record.byte_range.start)
            .is_some_and(|c| &c.kind == b"fcTL");
        if !opens_with_fctl {
            return self.still().decode_frame(bytes, record, for_display);
        }

        let ihdr = chunk_header(bytes, SIGNATURE.len())
            .and_then(|c| chunk_data(bytes, c))
            .filter(|d| d.len() == IHDR_LEN)
            .ok_or_else(|| corrupt("IHDR missing"))?;

        // Header chunks between IHDR and the first image data.
        let mut carried = Vec::new();
        let mut pos = SIGNATURE.len() + CHUNK_OVERHEAD + IHDR_LEN;
        while let Some(chunk) = chunk_header(bytes, pos) {
            if matches!(&chunk.kind, b"IDAT" | b"fdAT" | b"fcTL" | b"IEND") {
                break;
            }
            if chunk.end() > bytes.len() {
                return Err(corrupt("header chunks truncated"));
            }
            if CARRIED_CHUNKS.contains(&&chunk.kind) {
                carried.extend_from_slice(&bytes[chunk.start..chunk.end()]);
            }
            pos = chunk.end();
        }

        let body_end = record.byte_range.end.min(bytes.len());
        let mut pos = record.byte_range.start;
        let mut size = None;
        let mut image_data = Vec::new();
        while pos < body_end {
            let chunk = chunk_header(bytes, pos).ok_or_else(|| corrupt("frame data truncated"))?;
            let data = chunk_data(bytes, chunk)
                .filter(|_| chunk.end() <= body_end)
                .ok_or_else(|| corrupt("frame data truncated"))?;
            match &chunk.kind {
                b"fcTL" if data.len() >= FCTL_LEN => {
                    size = Some((read_u32_be(data, 4), read_u32_be(data, 8)));
                }
                b"IDAT" => image_data.extend_from_slice(data),
                b"fdAT" if data.len() >= 4 => image_data.extend_from_slice(&data[4..]),
                _ => return Err(corrupt("unexpected chunk inside frame")),
            }
            pos = chunk.end();
        }
        let (width, height) = size.ok_or_else(|| corrupt("fcTL missing"))?;
        if image_data.is_empty() {
            return Err(corrupt("frame has no image data"));
        }

        let mut header = ihdr.to_vec();
        header[0..4].copy_from_slice(&width.to_be_bytes());
        header[4..8].copy_from_slice(&height.to_be_bytes());

        let mut png = Vec::with_capacity(
            SIGNATURE.len() + carried.len() + image_data.len() + 3 * CHUNK_OVERHEAD + IHDR_LEN,
        );
        png.extend_from_slice(&SIGNATURE);
        write_chunk(&mut png, b"IHDR", &header);
        png.extend_from_slice(&carried);
        write_chunk(&mut png, b"IDAT", &image_data);
        write_chunk(&mut png, b"IEND", &[]);

        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .context("decode APNG frame")
            .map_err(|e| LoopframeError::frame_corrupt(record.index, format!("{e:#}")))?
            .to_rgba8();
        let (w, h) = decoded.dimensions();
        crop_to_rect(record.index, decoded.as_raw(), w, h, record.rect)
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut crc = crc32fast::Hasher::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
}

#[cfg(test)]
#[path = "../../tests/unit/source/apng.rs"]
mod tests;
