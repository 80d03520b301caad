use std::io::Cursor;

use super::*;

fn png_2x1() -> Vec<u8> {
    let img = image::RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 200, 100, 50, 128]).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[test]
fn final_png_is_a_single_full_canvas_frame() {
    let bytes = png_2x1();
    let src = StillSource::new(ImageType::Png);
    let scan = src.parse_container(&bytes, true).unwrap();

    let header = scan.header.unwrap();
    assert_eq!(header.canvas, CanvasSize::new(2, 1));
    assert_eq!(header.loop_count, 0);
    assert_eq!(scan.frames.len(), 1);
    assert_eq!(scan.frames[0].blend, BlendOperation::None);
    assert!(scan.ended);

    let raw = src.decode_frame(&bytes, &scan.frames[0], false).unwrap();
    assert_eq!(raw.rgba8, vec![10, 20, 30, 255, 200, 100, 50, 128]);
}

#[test]
fn streaming_png_exposes_header_but_no_frame() {
    let bytes = png_2x1();
    let src = StillSource::new(ImageType::Png);

    let scan = src.parse_container(&bytes[..8], false).unwrap();
    assert!(scan.header.is_none());

    let scan = src.parse_container(&bytes, false).unwrap();
    assert_eq!(scan.header.unwrap().canvas, CanvasSize::new(2, 1));
    assert!(scan.frames.is_empty());
    assert!(scan.partial.is_some());
}

#[test]
fn unreadable_header_when_final_is_container_corrupt() {
    let bytes = png_2x1();
    let err = StillSource::new(ImageType::Png)
        .parse_container(&bytes[..10], true)
        .unwrap_err();
    assert!(matches!(err, LoopframeError::ContainerCorrupt(_)));
}

#[test]
fn truncated_pixel_data_is_frame_corrupt() {
    let bytes = png_2x1();
    let src = StillSource::new(ImageType::Png);
    let cut = &bytes[..bytes.len() - 20];
    let scan = src.parse_container(cut, true).unwrap();
    let err = src.decode_frame(cut, &scan.frames[0], true).unwrap_err();
    assert!(matches!(err, LoopframeError::FrameCorrupt { index: 0, .. }));
}
