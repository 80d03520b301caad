use std::io::Cursor;

use anyhow::Context;

use crate::foundation::core::{
    BlendOperation, CanvasSize, DisposeMethod, FrameRect, MIN_FRAME_DURATION_SECS,
};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::source::{
    ContainerHeader, ContainerScan, FrameRecord, FrameSource, ImageType, RawFrame,
};

/// Single-frame source for formats decoded by the `image` crate.
///
/// The canvas size is reported as soon as the format header is readable; the one frame only
/// appears once the buffer is final, since these codecs cannot decode a partial stream.
#[derive(Clone, Copy, Debug)]
pub struct StillSource {
    ty: ImageType,
}

impl StillSource {
    /// Source for one of the single-frame formats.
    pub fn new(ty: ImageType) -> Self {
        Self { ty }
    }

    fn image_format(&self) -> Option<image::ImageFormat> {
        match self.ty {
            ImageType::Png => Some(image::ImageFormat::Png),
            ImageType::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageType::WebP => Some(image::ImageFormat::WebP),
            ImageType::Bmp => Some(image::ImageFormat::Bmp),
            ImageType::Tiff => Some(image::ImageFormat::Tiff),
            ImageType::Ico => Some(image::ImageFormat::Ico),
            _ => None,
        }
    }

    fn reader<'a>(&self, bytes: &'a [u8]) -> image::ImageReader<Cursor<&'a [u8]>> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes));
        if let Some(fmt) = self.image_format() {
            reader.set_format(fmt);
        }
        reader
    }
}

impl FrameSource for StillSource {
    fn image_type(&self) -> ImageType {
        self.ty
    }

    fn parse_container(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<ContainerScan> {
        let (width, height) = match self.reader(bytes).into_dimensions() {
            Ok(dims) => dims,
            Err(e) if is_final => {
                return Err(LoopframeError::container_corrupt(format!(
                    "{:?} header: {e}",
                    self.ty
                )));
            }
            Err(_) => return Ok(ContainerScan::default()),
        };

        let canvas = CanvasSize::new(width, height);
        if canvas.is_empty() {
            return Err(LoopframeError::container_corrupt(format!(
                "{:?} image is {width}x{height}",
                self.ty
            )));
        }

        let mut scan = ContainerScan {
            header: Some(ContainerHeader {
                canvas,
                loop_count: 0,
            }),
            ..ContainerScan::default()
        };
        let record = FrameRecord {
            index: 0,
            rect: FrameRect::full(canvas),
            duration: MIN_FRAME_DURATION_SECS,
            dispose: DisposeMethod::None,
            blend: BlendOperation::None,
            byte_range: 0..bytes.len(),
        };
        if is_final {
            scan.frames.push(record);
            scan.ended = true;
        } else {
            scan.partial = Some(record);
        }
        Ok(scan)
    }

    fn decode_frame(
        &self,
        bytes: &[u8],
        record: &FrameRecord,
        _for_display: bool,
    ) -> LoopframeResult<RawFrame> {
        let body = bytes
            .get(record.byte_range.clone())
            .ok_or_else(|| LoopframeError::frame_corrupt(record.index, "frame bytes out of range"))?;
        let decoded = self
            .reader(body)
            .decode()
            .with_context(|| format!("decode {:?} image", self.ty))
            .map_err(|e| LoopframeError::frame_corrupt(record.index, format!("{e:#}")))?;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        if (width, height) != (record.rect.width, record.rect.height) {
            return Err(LoopframeError::frame_corrupt(
                record.index,
                format!(
                    "decoded {width}x{height}, header said {}x{}",
                    record.rect.width, record.rect.height
                ),
            ));
        }

        Ok(RawFrame {
            rect: record.rect,
            rgba8: rgba.into_raw(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/still.rs"]
mod tests;
