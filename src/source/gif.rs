use std::io::Cursor;

use crate::foundation::core::{
    BlendOperation, CanvasSize, DisposeMethod, FrameRect, normalize_frame_duration,
};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::source::{
    ContainerHeader, ContainerScan, FrameRecord, FrameSource, ImageType, RawFrame,
    crop_to_rect, top_left_placement,
};

const SIGNATURE_LEN: usize = 6;
const SCREEN_DESCRIPTOR_END: usize = 13;
const IMAGE_DESCRIPTOR_LEN: usize = 10;

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_TRAILER: u8 = 0x3B;
const LABEL_GRAPHIC_CONTROL: u8 = 0xF9;
const LABEL_APPLICATION: u8 = 0xFF;

/// GIF frame source.
///
/// Container structure is scanned here at the block level so frames become visible as soon as
/// their sub-block chain is terminated. Pixel decoding of a single frame is delegated to the
/// `gif` crate by replaying the file header, that frame's blocks and a trailer.
#[derive(Clone, Copy, Debug, Default)]
pub struct GifSource;

impl GifSource {
    /// Create a GIF source.
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy, Debug)]
struct GraphicControl {
    start: usize,
    dispose: DisposeMethod,
    delay_cs: u16,
}

fn read_u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn color_table_len(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        0
    } else {
        3 * (1usize << ((packed & 0x07) + 1))
    }
}

/// Position right after a terminated sub-block chain starting at `pos`, or `None` if the chain
/// is not fully received.
fn skip_sub_blocks(bytes: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *bytes.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            return Some(pos);
        }
        pos += len;
        if pos > bytes.len() {
            return None;
        }
    }
}

fn dispose_from_gce(packed: u8) -> DisposeMethod {
    match (packed >> 2) & 0x07 {
        2 => DisposeMethod::Background,
        3 => DisposeMethod::Previous,
        _ => DisposeMethod::None,
    }
}

fn placement(canvas: CanvasSize, left: u16, top: u16, width: u16, height: u16) -> FrameRect {
    top_left_placement(
        canvas,
        u32::from(left),
        u32::from(top),
        u32::from(width),
        u32::from(height),
    )
}

/// Length of the file header plus the global color table.
fn header_len(bytes: &[u8]) -> Option<usize> {
    let packed = *bytes.get(10)?;
    let end = SCREEN_DESCRIPTOR_END + color_table_len(packed);
    (bytes.len() >= end).then_some(end)
}

/// Whether `body` (extensions followed by one image) ends with a terminated data chain.
fn frame_blocks_complete(body: &[u8]) -> bool {
    let mut pos = 0;
    while body.get(pos) == Some(&BLOCK_EXTENSION) {
        match skip_sub_blocks(body, pos + 2) {
            Some(next) => pos = next,
            None => return false,
        }
    }
    if body.get(pos) != Some(&BLOCK_IMAGE) {
        return false;
    }
    let Some(&packed) = body.get(pos + 9) else {
        return false;
    };
    let lzw_start = pos + IMAGE_DESCRIPTOR_LEN + color_table_len(packed);
    skip_sub_blocks(body, lzw_start + 1).is_some()
}

/// Frame record built from whatever control data precedes the image.
fn cut_frame(
    index: usize,
    byte_range: std::ops::Range<usize>,
    gce: Option<GraphicControl>,
    rect: FrameRect,
) -> FrameRecord {
    FrameRecord {
        index,
        rect,
        duration: normalize_frame_duration(f64::from(gce.map_or(0, |g| g.delay_cs)) / 100.0),
        dispose: gce.map_or(DisposeMethod::None, |g| g.dispose),
        blend: BlendOperation::Over,
        byte_range,
    }
}

/// Graphic control fields of an extension cut short at the end of the buffer.
fn cut_graphic_control(bytes: &[u8], pos: usize) -> GraphicControl {
    GraphicControl {
        start: pos,
        dispose: bytes
            .get(pos + 3)
            .map_or(DisposeMethod::None, |&packed| dispose_from_gce(packed)),
        delay_cs: if bytes.len() >= pos + 6 {
            read_u16_le(bytes, pos + 4)
        } else {
            0
        },
    }
}

fn check_signature(bytes: &[u8]) -> LoopframeResult<()> {
    let n = bytes.len().min(SIGNATURE_LEN);
    let ok = [b"GIF87a", b"GIF89a"]
        .iter()
        .any(|sig| sig[..n] == bytes[..n]);
    if ok {
        Ok(())
    } else {
        Err(LoopframeError::container_corrupt("missing GIF signature"))
    }
}

fn netscape_loop_count(bytes: &[u8], pos: usize) -> Option<u32> {
    // Application extension: [0x21 0xFF 0x0B "NETSCAPE2.0" 0x03 0x01 lo hi 0x00]
    let id = bytes.get(pos + 2..pos + 14)?;
    if id[0] != 11 || !(&id[1..] == b"NETSCAPE2.0" || &id[1..] == b"ANIMEXTS1.0") {
        return None;
    }
    let sub = bytes.get(pos + 14..pos + 18)?;
    if sub[0] >= 3 && sub[1] == 1 {
        Some(u32::from(u16::from_le_bytes([sub[2], sub[3]])))
    } else {
        None
    }
}

impl FrameSource for GifSource {
    fn image_type(&self) -> ImageType {
        ImageType::Gif
    }

    #[tracing::instrument(level = "trace", skip(self, bytes), fields(len = bytes.len()))]
    fn parse_container(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<ContainerScan> {
        check_signature(bytes)?;
        let Some(mut pos) = header_len(bytes) else {
            return Ok(ContainerScan::default());
        };

        let canvas = CanvasSize::new(
            u32::from(read_u16_le(bytes, 6)),
            u32::from(read_u16_le(bytes, 8)),
        );
        if canvas.is_empty() {
            return Err(LoopframeError::container_corrupt(format!(
                "logical screen is {}x{}",
                canvas.width, canvas.height
            )));
        }

        let mut loop_count = 0u32;
        let mut scan = ContainerScan::default();
        let mut gce: Option<GraphicControl> = None;

        while let Some(&block) = bytes.get(pos) {
            match block {
                BLOCK_EXTENSION => {
                    let label = bytes.get(pos + 1).copied();
                    let Some(end) = skip_sub_blocks(bytes, pos + 2) else {
                        if is_final {
                            let gce = match label {
                                Some(LABEL_GRAPHIC_CONTROL) => {
                                    Some(cut_graphic_control(bytes, pos))
                                }
                                _ => gce,
                            };
                            if let Some(g) = gce {
                                scan.partial = Some(cut_frame(
                                    scan.frames.len(),
                                    g.start..bytes.len(),
                                    Some(g),
                                    FrameRect::default(),
                                ));
                            }
                        }
                        break;
                    };
                    let Some(label) = label else {
                        break;
                    };
                    match label {
                        LABEL_GRAPHIC_CONTROL if bytes[pos + 2] >= 4 => {
                            gce = Some(GraphicControl {
                                start: pos,
                                dispose: dispose_from_gce(bytes[pos + 3]),
                                delay_cs: read_u16_le(bytes, pos + 4),
                            });
                        }
                        LABEL_APPLICATION => {
                            if let Some(n) = netscape_loop_count(bytes, pos) {
                                loop_count = n;
                            }
                        }
                        _ => {}
                    }
                    pos = end;
                }
                BLOCK_IMAGE => {
                    if bytes.len() < pos + IMAGE_DESCRIPTOR_LEN {
                        if is_final {
                            let rect = if bytes.len() >= pos + 9 {
                                placement(
                                    canvas,
                                    read_u16_le(bytes, pos + 1),
                                    read_u16_le(bytes, pos + 3),
                                    read_u16_le(bytes, pos + 5),
                                    read_u16_le(bytes, pos + 7),
                                )
                            } else {
                                FrameRect::default()
                            };
                            let start = gce.map_or(pos, |g| g.start);
                            scan.partial =
                                Some(cut_frame(scan.frames.len(), start..bytes.len(), gce, rect));
                        }
                        break;
                    }
                    let rect = placement(
                        canvas,
                        read_u16_le(bytes, pos + 1),
                        read_u16_le(bytes, pos + 3),
                        read_u16_le(bytes, pos + 5),
                        read_u16_le(bytes, pos + 7),
                    );
                    let lzw_start = pos + IMAGE_DESCRIPTOR_LEN + color_table_len(bytes[pos + 9]);
                    let start = gce.map_or(pos, |g| g.start);
                    let mut record = cut_frame(scan.frames.len(), start..bytes.len(), gce, rect);

                    // Skip the LZW minimum code size byte, then the data sub-blocks.
                    match skip_sub_blocks(bytes, lzw_start + 1) {
                        Some(end) => {
                            record.byte_range = start..end;
                            scan.frames.push(record);
                            gce = None;
                            pos = end;
                        }
                        None => {
                            scan.partial = Some(record);
                            break;
                        }
                    }
                }
                BLOCK_TRAILER => {
                    scan.ended = true;
                    break;
                }
                other => {
                    if scan.frames.is_empty() {
                        return Err(LoopframeError::container_corrupt(format!(
                            "unexpected block 0x{other:02x} at offset {pos}"
                        )));
                    }
                    tracing::warn!(
                        offset = pos,
                        frames = scan.frames.len(),
                        "unexpected GIF block 0x{other:02x}; ignoring the rest of the stream"
                    );
                    scan.ended = true;
                    break;
                }
            }
        }

        scan.header = Some(ContainerHeader { canvas, loop_count });
        Ok(scan)
    }

    #[tracing::instrument(level = "trace", skip(self, bytes, record), fields(index = record.index))]
    fn decode_frame(
        &self,
        bytes: &[u8],
        record: &FrameRecord,
        _for_display: bool,
    ) -> LoopframeResult<RawFrame> {
        let corrupt = |reason: String| LoopframeError::frame_corrupt(record.index, reason);

        let header_end = header_len(bytes).ok_or_else(|| corrupt("header missing".into()))?;
        let body = bytes
            .get(record.byte_range.clone())
            .ok_or_else(|| corrupt("frame bytes out of range".into()))?;
        if !frame_blocks_complete(body) {
            return Err(corrupt("frame data truncated".into()));
        }

        let mut stream = Vec::with_capacity(header_end + body.len() + 1);
        stream.extend_from_slice(&bytes[..header_end]);
        stream.extend_from_slice(body);
        stream.push(BLOCK_TRAILER);

        let mut opts = gif::DecodeOptions::new();
        opts.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = opts
            .read_info(Cursor::new(stream))
            .map_err(|e| corrupt(e.to_string()))?;
        let frame = decoder
            .read_next_frame()
            .map_err(|e| corrupt(e.to_string()))?
            .ok_or_else(|| corrupt("no image data".into()))?;

        crop_to_rect(
            record.index,
            &frame.buffer,
            u32::from(frame.width),
            u32::from(frame.height),
            record.rect,
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/gif.rs"]
mod tests;
