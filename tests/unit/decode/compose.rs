use super::*;

const CANVAS: CanvasSize = CanvasSize {
    width: 4,
    height: 4,
};

fn record(index: usize, rect: FrameRect, dispose: DisposeMethod, blend: BlendOperation) -> FrameRecord {
    FrameRecord {
        index,
        rect,
        duration: 0.1,
        dispose,
        blend,
        byte_range: 0..0,
    }
}

fn solid(rect: FrameRect, px: [u8; 4]) -> RawFrame {
    RawFrame {
        rect,
        rgba8: px.repeat((rect.width * rect.height) as usize),
    }
}

fn inner() -> FrameRect {
    FrameRect {
        x: 1,
        y: 1,
        width: 2,
        height: 2,
    }
}

#[test]
fn previous_disposal_does_not_leak_into_next_frame() {
    let full = FrameRect::full(CANVAS);
    let f0 = record(0, full, DisposeMethod::None, BlendOperation::None);
    let f1 = record(1, inner(), DisposeMethod::Previous, BlendOperation::Over);
    let f2 = record(2, full, DisposeMethod::None, BlendOperation::Over);

    let red = solid(full, [255, 0, 0, 255]);
    let white = solid(inner(), [255, 255, 255, 255]);
    // Frame 2 is mostly transparent with one opaque blue pixel in the top-left corner.
    let mut f2_px = [0u8, 0, 0, 0].repeat(16);
    f2_px[..4].copy_from_slice(&[0, 0, 255, 255]);
    let blue_dot = RawFrame {
        rect: full,
        rgba8: f2_px.clone(),
    };

    let mut c = Compositor::new(CANVAS);
    c.composite(&f0, &red);
    let frame0 = c.snapshot(false);
    c.composite(&f1, &white);
    assert_eq!(c.snapshot(false).pixel(1, 1), Some([255, 255, 255, 255]));
    c.composite(&f2, &blue_dot);
    let frame2 = c.snapshot(false);

    // Expected: frame 0 overwritten by frame 2's own pixels only.
    let mut expected = frame0.pixels.clone();
    for (d, s) in expected.chunks_exact_mut(4).zip(f2_px.chunks_exact(4)) {
        if s[3] != 0 {
            d.copy_from_slice(s);
        }
    }
    assert_eq!(frame2.pixels, expected);
    assert_eq!(frame2.pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(frame2.pixel(0, 0), Some([0, 0, 255, 255]));
}

#[test]
fn background_disposal_clears_only_the_frame_rect() {
    let full = FrameRect::full(CANVAS);
    let mut c = Compositor::new(CANVAS);
    c.composite(
        &record(0, full, DisposeMethod::None, BlendOperation::None),
        &solid(full, [0, 255, 0, 255]),
    );
    c.composite(
        &record(1, inner(), DisposeMethod::Background, BlendOperation::None),
        &solid(inner(), [255, 255, 255, 255]),
    );
    // Frame 3 draws nothing visible; it only reveals the disposal of frame 1.
    let empty = FrameRect {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    };
    c.composite(
        &record(2, empty, DisposeMethod::None, BlendOperation::Over),
        &solid(empty, [0, 0, 0, 0]),
    );
    let out = c.snapshot(false);
    assert_eq!(out.pixel(1, 1), Some([0, 0, 0, 0]));
    assert_eq!(out.pixel(2, 2), Some([0, 0, 0, 0]));
    assert_eq!(out.pixel(0, 0), Some([0, 255, 0, 255]));
    assert_eq!(out.pixel(3, 3), Some([0, 255, 0, 255]));
}

#[test]
fn blend_none_overwrites_alpha_while_over_keeps_canvas() {
    let full = FrameRect::full(CANVAS);
    let clear = solid(inner(), [0, 0, 0, 0]);

    let mut c = Compositor::new(CANVAS);
    c.composite(
        &record(0, full, DisposeMethod::None, BlendOperation::None),
        &solid(full, [9, 9, 9, 255]),
    );
    c.composite(
        &record(1, inner(), DisposeMethod::None, BlendOperation::Over),
        &clear,
    );
    assert_eq!(c.snapshot(false).pixel(1, 1), Some([9, 9, 9, 255]));

    c.composite(
        &record(2, inner(), DisposeMethod::None, BlendOperation::None),
        &clear,
    );
    assert_eq!(c.snapshot(false).pixel(1, 1), Some([0, 0, 0, 0]));
    assert_eq!(c.last_index(), Some(2));
}

#[test]
fn bottom_left_rect_lands_on_bottom_rows() {
    let mut c = Compositor::new(CANVAS);
    let bottom = FrameRect {
        x: 0,
        y: 0,
        width: 4,
        height: 1,
    };
    c.composite(
        &record(0, bottom, DisposeMethod::None, BlendOperation::None),
        &solid(bottom, [1, 2, 3, 255]),
    );
    let out = c.snapshot(false);
    assert_eq!(out.pixel(0, 3), Some([1, 2, 3, 255]));
    assert_eq!(out.pixel(0, 0), Some([0, 0, 0, 0]));
}

#[test]
fn display_snapshot_is_premultiplied() {
    let full = FrameRect::full(CANVAS);
    let mut c = Compositor::new(CANVAS);
    c.composite(
        &record(0, full, DisposeMethod::None, BlendOperation::None),
        &solid(full, [200, 100, 50, 128]),
    );
    let display = c.snapshot(true);
    assert_eq!(display.alpha, AlphaMode::Premultiplied);
    assert_eq!(
        display.pixel(0, 0),
        Some([
            ((200u16 * 128 + 127) / 255) as u8,
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            128
        ])
    );
    assert_eq!(c.snapshot(false).alpha, AlphaMode::Straight);
}

#[test]
fn reset_clears_canvas_and_history() {
    let full = FrameRect::full(CANVAS);
    let mut c = Compositor::new(CANVAS);
    c.composite(
        &record(0, full, DisposeMethod::Previous, BlendOperation::None),
        &solid(full, [1, 1, 1, 255]),
    );
    c.reset();
    assert_eq!(c.last_index(), None);
    assert!(c.snapshot(false).pixels.iter().all(|&b| b == 0));
}

#[test]
fn blend_start_skips_to_latest_independent_frame() {
    let full = FrameRect::full(CANVAS);
    let records = vec![
        record(0, full, DisposeMethod::None, BlendOperation::None),
        record(1, inner(), DisposeMethod::None, BlendOperation::Over),
        record(2, full, DisposeMethod::None, BlendOperation::None),
        record(3, inner(), DisposeMethod::None, BlendOperation::Over),
        record(4, full, DisposeMethod::Background, BlendOperation::Over),
        record(5, inner(), DisposeMethod::None, BlendOperation::Over),
        record(6, full, DisposeMethod::Previous, BlendOperation::None),
        record(7, inner(), DisposeMethod::None, BlendOperation::Over),
    ];

    assert_eq!(blend_start_index(&records, 0, CANVAS), 0);
    assert_eq!(blend_start_index(&records, 1, CANVAS), 0);
    assert_eq!(blend_start_index(&records, 2, CANVAS), 2);
    assert_eq!(blend_start_index(&records, 3, CANVAS), 2);
    // Frame 4 blends over, but disposes the whole canvas, so frame 5 starts clean.
    assert_eq!(blend_start_index(&records, 4, CANVAS), 2);
    assert_eq!(blend_start_index(&records, 5, CANVAS), 5);
    // Frame 6 restores what was beneath it, so it cannot be a starting point.
    assert_eq!(blend_start_index(&records, 7, CANVAS), 5);
}
