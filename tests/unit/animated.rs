use std::time::Duration;

use super::*;
use crate::foundation::core::CanvasSize;
use crate::playback::PlayState;
use crate::test_support::gif_builder::{FrameSpec, build_gif, three_color_gif};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "loopframe_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn memory_figures_follow_canvas_and_frames() {
    let img = AnimatedImage::from_bytes(&three_color_gif(3, 2)).unwrap();
    assert_eq!(img.frame_count(), 3);
    assert_eq!(img.bytes_per_frame(), 3 * 2 * 4);
    assert_eq!(img.animated_image_memory_size(), 3 * 3 * 2 * 4);
    assert_eq!(img.meta().canvas(), CanvasSize::new(3, 2));
}

#[test]
fn content_rect_reports_frame_placement() {
    let bytes = build_gif(
        6,
        4,
        None,
        &[FrameSpec::solid(6, 4, 0), FrameSpec::solid(2, 1, 1).at(1, 0)],
    );
    let img = AnimatedImage::from_bytes(&bytes).unwrap();
    assert_eq!(img.content_rect(0), Some(FrameRect::full(CanvasSize::new(6, 4))));
    // Top row in GIF coordinates is the highest row from the bottom.
    assert_eq!(
        img.content_rect(1),
        Some(FrameRect {
            x: 1,
            y: 3,
            width: 2,
            height: 1
        })
    );
    assert_eq!(img.content_rect(2), None);
}

#[test]
fn scale_is_validated_and_applied() {
    let img = AnimatedImage::from_bytes(&three_color_gif(2, 2))
        .unwrap()
        .with_scale(2.0)
        .unwrap();
    assert_eq!(img.meta().scale, 2.0);
    assert_eq!(img.properties().scale, 2.0);

    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            AnimatedImage::streaming(bad).unwrap_err(),
            LoopframeError::Validation(_)
        ));
    }
}

#[test]
fn loads_from_path() {
    let path = temp_path("from_path.gif");
    std::fs::write(&path, three_color_gif(2, 2)).unwrap();
    let img = AnimatedImage::from_path(&path).unwrap();
    assert_eq!(img.frame_count(), 3);
    std::fs::remove_file(&path).unwrap();

    let err = AnimatedImage::from_path(temp_path("missing.gif")).unwrap_err();
    assert!(matches!(err, LoopframeError::Other(_)));
}

#[test]
fn display_and_encode_frames_differ_only_in_alpha_mode() {
    let img = AnimatedImage::from_bytes(&three_color_gif(2, 2)).unwrap();
    let shown = img.frame(1).unwrap();
    let encoded = img.frame_for_encoding(1).unwrap();
    assert_eq!(shown.pixel(0, 0), Some([0, 255, 0, 255]));
    assert_eq!(shown.pixels, encoded.pixels);
    assert_ne!(shown.alpha, encoded.alpha);
}

#[test]
fn player_honors_preload_and_config() {
    let mut img = AnimatedImage::from_bytes(&three_color_gif(2, 2)).unwrap();
    img.set_preload_all_frames(true);
    assert!(img.preload_all_frames());

    let cfg = PlayerConfig {
        auto_play: false,
        max_buffer_bytes: 16,
        display_wait_ms: 500,
        ..PlayerConfig::default()
    };
    let mut player = img.player(&cfg).unwrap();
    assert!(player.cache().is_eager());
    assert_eq!(player.cache().stats().budget_bytes, None);

    player.advance(0.0);
    assert_eq!(player.state(), PlayState::Stopped);
    assert_eq!(player.displayed_index(), Some(0));

    img.set_preload_all_frames(false);
    let windowed = img.player(&cfg).unwrap();
    assert_eq!(windowed.cache().stats().budget_bytes, Some(16));
    assert!(!windowed.cache().is_eager());
}

#[test]
fn player_rejects_invalid_config() {
    let img = AnimatedImage::from_bytes(&three_color_gif(2, 2)).unwrap();
    let cfg = PlayerConfig {
        max_stall_secs: -1.0,
        ..PlayerConfig::default()
    };
    assert!(matches!(
        img.player(&cfg).unwrap_err(),
        LoopframeError::Validation(_)
    ));
}

#[test]
fn streaming_image_plays_as_bytes_arrive() {
    let bytes = three_color_gif(2, 2);
    let img = AnimatedImage::streaming(1.0).unwrap();
    let cfg = PlayerConfig {
        display_wait_ms: 500,
        ..PlayerConfig::default()
    };
    let mut player = img.player(&cfg).unwrap();

    player.advance(0.0);
    assert_eq!(player.displayed_index(), None);

    img.update_data(&bytes, true).unwrap();
    player.advance(0.0);
    assert!(player.is_playing());
    player.advance(Duration::from_millis(100).as_secs_f64());
    assert_eq!(player.current_index(), 1);
}
