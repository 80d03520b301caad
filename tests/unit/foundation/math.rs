use super::*;

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u8(255, 255), 255);
    assert_eq!(mul_div255_u8(128, 255), 128);
    assert_eq!(mul_div255_u8(100, 128), ((100u16 * 128 + 127) / 255) as u8);
    assert_eq!(mul_div255_u16(0, 200), 0);
}

#[test]
fn premultiply_zeroes_transparent_and_keeps_opaque() {
    let mut px = vec![
        100, 50, 200, 128, //
        9, 9, 9, 0, //
        1, 2, 3, 255,
    ];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(
        px,
        vec![
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128,
            0,
            0,
            0,
            0,
            1,
            2,
            3,
            255,
        ]
    );
}

#[test]
fn over_straight_extremes() {
    let dst = [10, 20, 30, 255];
    assert_eq!(over_straight(dst, [1, 2, 3, 255]), [1, 2, 3, 255]);
    assert_eq!(over_straight(dst, [1, 2, 3, 0]), dst);
    assert_eq!(over_straight([0, 0, 0, 0], [200, 100, 50, 128]), [200, 100, 50, 128]);
}

#[test]
fn over_straight_half_alpha_on_opaque() {
    let out = over_straight([0, 0, 0, 255], [255, 255, 255, 128]);
    assert_eq!(out[3], 255);
    assert!((i32::from(out[0]) - 128).abs() <= 1);
}
