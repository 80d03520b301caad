use std::io::Cursor;

use super::*;
use crate::decode::IncrementalDecoder;
use crate::test_support::anim_builder::{
    APNG_DISPOSE_BACKGROUND, APNG_DISPOSE_PREVIOUS, AnimFrame, build_apng,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

/// Red canvas, a transparent hole that replaces instead of blending, then a blue square.
fn layered_apng() -> Vec<u8> {
    build_apng(
        4,
        4,
        3,
        &[
            AnimFrame::solid(4, 4, RED),
            AnimFrame::solid(2, 2, CLEAR)
                .at(1, 1)
                .replace()
                .dispose(APNG_DISPOSE_PREVIOUS)
                .delay_ms(50),
            AnimFrame::solid(2, 2, BLUE)
                .at(2, 2)
                .dispose(APNG_DISPOSE_BACKGROUND)
                .delay_ms(200),
        ],
    )
}

#[test]
fn scan_reads_actl_and_frame_controls() {
    let bytes = layered_apng();
    let scan = ApngSource::new().parse_container(&bytes, true).unwrap();

    let header = scan.header.unwrap();
    assert_eq!(header.canvas, CanvasSize::new(4, 4));
    assert_eq!(header.loop_count, 3);
    assert_eq!(scan.frames.len(), 3);
    assert!(scan.partial.is_none());
    assert!(scan.ended);

    let [f0, f1, f2] = &scan.frames[..] else {
        panic!("expected three frames");
    };
    assert_eq!(f0.rect, FrameRect::full(CanvasSize::new(4, 4)));
    assert_eq!(f0.duration, 0.1);
    assert_eq!(f0.blend, BlendOperation::Over);

    assert_eq!(
        f1.rect,
        FrameRect {
            x: 1,
            y: 1,
            width: 2,
            height: 2
        }
    );
    assert_eq!(f1.duration, 0.05);
    assert_eq!(f1.blend, BlendOperation::None);
    assert_eq!(f1.dispose, DisposeMethod::Previous);

    assert_eq!(f2.rect.y, 0);
    assert_eq!(f2.duration, 0.2);
    assert_eq!(f2.dispose, DisposeMethod::Background);
    assert!(f0.byte_range.end <= f1.byte_range.start);
    assert!(f1.byte_range.end <= f2.byte_range.start);
}

#[test]
fn sub_frame_decodes_to_its_rectangle() {
    let bytes = layered_apng();
    let src = ApngSource::new();
    let scan = src.parse_container(&bytes, true).unwrap();

    let raw = src.decode_frame(&bytes, &scan.frames[2], false).unwrap();
    assert_eq!(raw.rect, scan.frames[2].rect);
    assert_eq!(raw.rgba8, BLUE.repeat(4));
}

#[test]
fn replace_blend_and_restore_previous_compose() {
    let dec = IncrementalDecoder::from_bytes(&layered_apng(), 1.0).unwrap();
    assert_eq!(dec.frame_count(), 3);

    let f1 = dec.decode_frame(1, false).unwrap();
    assert_eq!(f1.pixel(0, 0), Some(RED));
    assert_eq!(f1.pixel(1, 1), Some(CLEAR));
    assert_eq!(f1.pixel(2, 2), Some(CLEAR));

    let f2 = dec.decode_frame(2, false).unwrap();
    assert_eq!(f2.pixel(1, 1), Some(RED));
    assert_eq!(f2.pixel(2, 2), Some(BLUE));
    assert_eq!(f2.pixel(3, 3), Some(BLUE));
    assert_eq!(f2.pixel(0, 3), Some(RED));
}

#[test]
fn every_prefix_scans_and_frames_only_grow() {
    let bytes = layered_apng();
    let src = ApngSource::new();
    let mut seen = 0;
    for len in 0..=bytes.len() {
        let scan = src.parse_container(&bytes[..len], false).unwrap();
        assert!(scan.frames.len() >= seen, "frames shrank at {len}");
        seen = scan.frames.len();
    }
    assert_eq!(seen, 3);
}

#[test]
fn frame_cut_inside_fctl_is_partial_once_final() {
    let bytes = layered_apng();
    let src = ApngSource::new();
    let full = src.parse_container(&bytes, true).unwrap();
    let cut = &bytes[..full.frames[2].byte_range.start + 10];

    let streaming = src.parse_container(cut, false).unwrap();
    assert_eq!(streaming.frames.len(), 2);
    assert!(streaming.partial.is_none());

    let scan = src.parse_container(cut, true).unwrap();
    assert_eq!(scan.frames.len(), 2);
    let partial = scan.partial.unwrap();
    assert_eq!(partial.index, 2);
    let err = src.decode_frame(cut, &partial, true).unwrap_err();
    assert!(matches!(err, LoopframeError::FrameCorrupt { index: 2, .. }));
}

#[test]
fn png_without_actl_is_a_still_frame() {
    let img = image::RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 200, 100, 50, 128]).unwrap();
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();

    let src = ApngSource::new();
    let scan = src.parse_container(&bytes, true).unwrap();
    assert_eq!(scan.frames.len(), 1);
    assert_eq!(scan.header.unwrap().loop_count, 0);
    let raw = src.decode_frame(&bytes, &scan.frames[0], false).unwrap();
    assert_eq!(raw.rgba8, vec![10, 20, 30, 255, 200, 100, 50, 128]);
}

#[test]
fn bad_signature_and_missing_ihdr_are_container_corrupt() {
    let src = ApngSource::new();
    let err = src.parse_container(b"\x89PNX", false).unwrap_err();
    assert!(matches!(err, LoopframeError::ContainerCorrupt(_)));

    let mut bytes = layered_apng();
    bytes[12..16].copy_from_slice(b"IDAT");
    let err = src.parse_container(&bytes, false).unwrap_err();
    assert!(matches!(err, LoopframeError::ContainerCorrupt(_)));
}
