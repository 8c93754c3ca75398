use image::Rgba;

use super::*;
use crate::foundation::core::Rgb8;

const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const RED: Rgba<u8> = Rgba([200, 30, 30, 255]);

fn small_cfg() -> CompositorConfig {
    CompositorConfig {
        pixels_per_cm: 2,
        label_band_px: 20,
        label_font_px: 12,
        label_padding_px: 4,
        ..CompositorConfig::default()
    }
}

fn keyed_render(w: u32, h: u32, subject: PixelRect) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(w, h, GREEN);
    for y in subject.y..subject.bottom() {
        for x in subject.x..subject.right() {
            img.put_pixel(x, y, RED);
        }
    }
    img
}

fn alpha_channel(img: &RgbaImage) -> Vec<u8> {
    img.pixels().map(|p| p.0[3]).collect()
}

#[test]
fn pure_key_image_is_an_empty_subject() {
    let raw = RgbaImage::from_pixel(32, 32, GREEN);
    let keyed = remove_key(&raw, &small_cfg());
    assert!(keyed.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    assert!(matches!(
        crop_to_content(&keyed, 8),
        Err(ForgeError::EmptySubject(_))
    ));

    let err = process_character("Ghost", 120, &raw, &small_cfg()).unwrap_err();
    assert!(matches!(err, ForgeError::EmptySubject(_)));
    assert!(err.to_string().contains("Ghost"));
}

#[test]
fn subject_filling_the_frame_is_clipped() {
    let raw = RgbaImage::from_pixel(20, 40, RED);
    let err = process_character("Giant", 200, &raw, &small_cfg()).unwrap_err();
    assert!(matches!(err, ForgeError::ClippedSubject(_)));
}

#[test]
fn subject_touching_three_edges_is_accepted() {
    // Feet on the bottom edge, head on the top edge, hand on the left edge.
    let raw = keyed_render(30, 40, PixelRect::new(0, 0, 20, 40));
    let reference = process_character("Tall", 100, &raw, &small_cfg()).unwrap();
    assert_eq!(reference.sprite_height_px(), 200);
}

#[test]
fn key_band_gets_interpolated_alpha_and_despill() {
    let cfg = CompositorConfig::default();
    let mut raw = RgbaImage::from_pixel(3, 1, GREEN);
    raw.put_pixel(1, 0, Rgba([60, 200, 60, 255]));
    raw.put_pixel(2, 0, Rgba([0, 0, 255, 255]));

    let keyed = remove_key(&raw, &cfg);
    assert_eq!(keyed.get_pixel(0, 0).0, [0, 0, 0, 0]);

    let edge = keyed.get_pixel(1, 0).0;
    assert!(edge[3] > 0 && edge[3] < 255, "edge alpha {edge:?}");
    assert_eq!(edge[1], 60, "green spill clamped to max(r, b)");

    assert_eq!(keyed.get_pixel(2, 0).0, [0, 0, 255, 255]);
}

#[test]
fn despill_can_be_disabled() {
    let cfg = CompositorConfig {
        despill: false,
        ..CompositorConfig::default()
    };
    let raw = RgbaImage::from_pixel(1, 1, Rgba([60, 200, 60, 255]));
    let keyed = remove_key(&raw, &cfg);
    assert_eq!(keyed.get_pixel(0, 0).0[1], 200);
}

#[test]
fn key_removal_is_idempotent_on_alpha() {
    let cfg = CompositorConfig::default();
    let mut raw = keyed_render(16, 16, PixelRect::new(4, 4, 8, 8));
    raw.put_pixel(3, 4, Rgba([60, 200, 60, 255]));
    raw.put_pixel(12, 4, Rgba([90, 180, 90, 255]));
    raw.put_pixel(4, 3, Rgba([20, 240, 20, 255]));

    let once = remove_key(&raw, &cfg);
    let twice = remove_key(&once, &cfg);
    assert_eq!(alpha_channel(&once), alpha_channel(&twice));

    let (cropped, _) = crop_to_content(&once, cfg.alpha_epsilon).unwrap();
    let rekeyed = remove_key(&cropped, &cfg);
    assert_eq!(alpha_channel(&cropped), alpha_channel(&rekeyed));
}

#[test]
fn key_color_is_configurable() {
    let cfg = CompositorConfig {
        key_color: Rgb8::new(0, 0, 255),
        ..CompositorConfig::default()
    };
    let raw = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
    assert!(remove_key(&raw, &cfg).pixels().all(|p| p.0[3] == 0));
    let green = RgbaImage::from_pixel(2, 2, GREEN);
    assert!(remove_key(&green, &cfg).pixels().all(|p| p.0[3] == 255));
}

#[test]
fn crop_finds_tight_bounds_and_is_idempotent() {
    let raw = keyed_render(40, 60, PixelRect::new(10, 5, 20, 50));
    let keyed = remove_key(&raw, &small_cfg());
    let (once, bounds) = crop_to_content(&keyed, 8).unwrap();
    assert_eq!(bounds, PixelRect::new(10, 5, 20, 50));
    assert_eq!(once.dimensions(), (20, 50));

    let (twice, bounds2) = crop_to_content(&once, 8).unwrap();
    assert_eq!(bounds2, PixelRect::new(0, 0, 20, 50));
    assert_eq!(once, twice);
}

#[test]
fn near_zero_alpha_does_not_count_as_content() {
    let mut img = RgbaImage::new(10, 10);
    img.put_pixel(0, 0, Rgba([255, 255, 255, 5]));
    img.put_pixel(5, 5, Rgba([255, 255, 255, 255]));
    assert_eq!(content_bounds(&img, 8), Some(PixelRect::new(5, 5, 1, 1)));
    assert_eq!(content_bounds(&img, 4), Some(PixelRect::new(0, 0, 6, 6)));
}

#[test]
fn calibration_hits_exact_height_and_keeps_aspect() {
    let sprite = RgbaImage::from_pixel(20, 50, RED);
    let scaled = calibrate_height(&sprite, 90, 10).unwrap();
    assert_eq!(scaled.height(), 900);
    assert_eq!(scaled.width(), 360);
    // A solid sprite stays solid after resampling.
    assert!(scaled.pixels().all(|p| p.0[3] == 255));
}

#[test]
fn calibration_rejects_out_of_range_heights() {
    let sprite = RgbaImage::from_pixel(2, 4, RED);
    assert!(matches!(
        calibrate_height(&sprite, 49, 10),
        Err(ForgeError::Validation(_))
    ));
    assert!(calibrate_height(&sprite, 251, 10).is_err());
    calibrate_height(&sprite, 50, 1).unwrap();
    calibrate_height(&sprite, 250, 1).unwrap();
}

#[test]
fn calibration_rejects_resolutions_that_overflow() {
    let sprite = RgbaImage::from_pixel(2, 4, RED);
    assert!(matches!(
        calibrate_height(&sprite, 250, 20_000_000),
        Err(ForgeError::Validation(_))
    ));
    assert!(calibrate_height(&sprite, 100, 0).is_err());

    // A very wide crop at full resolution would exceed the sprite width limit.
    let strip = RgbaImage::from_pixel(4000, 1, RED);
    assert!(matches!(
        calibrate_height(&strip, 250, 100),
        Err(ForgeError::Validation(_))
    ));
}

#[test]
fn process_reports_oversized_configs_as_errors() {
    let raw = keyed_render(20, 40, PixelRect::new(5, 5, 4, 30));
    let cfg = CompositorConfig {
        pixels_per_cm: 20_000_000,
        ..small_cfg()
    };
    assert!(matches!(
        process_character("Luna", 250, &raw, &cfg),
        Err(ForgeError::Validation(_))
    ));

    let cfg = CompositorConfig {
        label_padding_px: u32::MAX,
        ..small_cfg()
    };
    assert!(process_character("Luna", 100, &raw, &cfg).is_err());
}

#[test]
fn name_plate_padding_overflow_is_an_error() {
    let sprite = RgbaImage::from_pixel(4, 8, RED);
    let cfg = CompositorConfig {
        label_padding_px: u32::MAX,
        ..small_cfg()
    };
    assert!(attach_name_plate(&sprite, "Luna", &cfg).is_err());
}

#[test]
fn name_plate_sits_under_an_untouched_sprite() {
    let cfg = small_cfg();
    let raw = keyed_render(40, 60, PixelRect::new(10, 5, 20, 50));
    let reference = process_character("Luna", 130, &raw, &cfg).unwrap();

    let rect = reference.sprite_rect;
    assert_eq!(rect.y, 0);
    assert_eq!(rect.height, 130 * 2);
    let processed = reference.processed_image.as_ref();
    assert_eq!(processed.height(), rect.height + cfg.label_band_px);

    // Plate rows are opaque across the whole canvas width.
    for y in rect.bottom()..processed.height() {
        for x in 0..processed.width() {
            assert_eq!(processed.get_pixel(x, y).0[3], 255);
        }
    }
    // Sprite rows keep transparent margins left and right of the subject.
    assert_eq!(processed.get_pixel(0, 0).0[3], 0);
    assert_eq!(processed.get_pixel(rect.x + rect.width / 2, rect.height / 2).0[3], 255);
}

#[test]
fn long_names_widen_the_canvas() {
    let cfg = small_cfg();
    let raw = keyed_render(20, 40, PixelRect::new(5, 5, 4, 30));
    let reference =
        process_character("Professor Archibald Wellington", 60, &raw, &cfg).unwrap();
    let text_w = label_width("Professor Archibald Wellington", cfg.label_font_px).unwrap();
    assert_eq!(
        reference.processed_image.width(),
        text_w.max(reference.sprite_rect.width) + 2 * cfg.label_padding_px
    );
    assert!(reference.sprite_rect.width < reference.processed_image.width());
}

#[test]
fn wide_names_keep_their_ink_off_the_canvas_edges() {
    if !matches!(crate::composite::label::measure_text("W", 12), Ok(Some(_))) {
        eprintln!("skipping: no system font resolves for name plates");
        return;
    }
    let cfg = small_cfg();
    let raw = keyed_render(20, 40, PixelRect::new(5, 5, 4, 30));
    let reference = process_character("WWWWWWWWWW", 100, &raw, &cfg).unwrap();
    let img = reference.processed_image.as_ref();
    let plate_rows = reference.sprite_rect.bottom()..img.height();
    let dark = |x: u32| {
        plate_rows
            .clone()
            .any(|y| img.get_pixel(x, y).0[..3].iter().all(|&c| c < 128))
    };
    assert!(!dark(0));
    assert!(!dark(img.width() - 1));
    assert!((0..img.width()).any(dark));
}

#[test]
fn process_rejects_blank_names() {
    let raw = keyed_render(20, 40, PixelRect::new(5, 5, 4, 30));
    assert!(matches!(
        process_character("   ", 100, &raw, &small_cfg()),
        Err(ForgeError::Validation(_))
    ));
}
