//! Chroma Compositor: key removal, crop-to-content, height calibration and name plate.
//!
//! The stages are exposed individually so that callers (and tests) can check the invariants
//! each one guarantees:
//!
//! 1. [`remove_key`] maps color distance from the key to alpha. It only ever lowers alpha, so
//!    running it on its own output is a no-op on the alpha channel.
//! 2. [`crop_to_content`] trims to the bounding box of pixels above the alpha epsilon.
//! 3. [`calibrate_height`] scales the crop to exactly `height_cm * pixels_per_cm` rows.
//! 4. [`attach_name_plate`] adds the label band under the sprite without touching it.
//!
//! [`process_character`] chains the four stages and adds the subject checks.
use std::sync::Arc;

use image::{RgbaImage, imageops::FilterType};

use crate::{
    composite::{
        label::{label_width, render_name_plate},
        pixel::{paste_replace, premultiply_in_place, unpremultiply_in_place},
    },
    foundation::{
        config::CompositorConfig,
        core::{MAX_HEIGHT_CM, MAX_PIXELS_PER_CM, MIN_HEIGHT_CM, PixelRect},
        error::{ForgeError, ForgeResult},
    },
    panel::model::CharacterReference,
};

/// Widest sprite `calibrate_height` will produce.
pub const MAX_SPRITE_WIDTH_PX: u32 = 1 << 15;

/// Replace the key-color backdrop with transparency.
///
/// Distance below `transparent_below` gives alpha 0, distance at or above `opaque_above` keeps
/// the pixel opaque, and the band in between ramps linearly. The result alpha is the minimum of
/// the computed and the existing alpha.
pub fn remove_key(img: &RgbaImage, cfg: &CompositorConfig) -> RgbaImage {
    let key = cfg.key_color;
    let spill_channel = key.dominant_channel();
    let lo = cfg.transparent_below;
    let hi = cfg.opaque_above;

    let mut out = img.clone();
    for px in out.pixels_mut() {
        let [r, g, b, a] = px.0;
        let d = key.distance([r, g, b]);

        let keyed = if d < lo {
            0u8
        } else if d >= hi || hi <= lo {
            255u8
        } else {
            (((d - lo) / (hi - lo)) * 255.0).round().clamp(0.0, 255.0) as u8
        };
        let alpha = a.min(keyed);

        if alpha == 0 {
            px.0 = [0, 0, 0, 0];
            continue;
        }
        if cfg.despill && keyed < 255 {
            let mut c = [r, g, b];
            let others = c
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != spill_channel)
                .map(|(_, v)| *v)
                .max()
                .unwrap_or(0);
            c[spill_channel] = c[spill_channel].min(others);
            px.0 = [c[0], c[1], c[2], alpha];
        } else {
            px.0[3] = alpha;
        }
    }
    out
}

/// Bounding box of every pixel whose alpha exceeds `alpha_epsilon`, or `None` if there is none.
pub fn content_bounds(img: &RgbaImage, alpha_epsilon: u8) -> Option<PixelRect> {
    let (w, h) = img.dimensions();
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for (x, y, px) in img.enumerate_pixels() {
        if px.0[3] > alpha_epsilon {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !any || w == 0 || h == 0 {
        return None;
    }
    Some(PixelRect::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

/// Crop to [`content_bounds`]. Fails with [`ForgeError::EmptySubject`] when nothing is visible.
pub fn crop_to_content(img: &RgbaImage, alpha_epsilon: u8) -> ForgeResult<(RgbaImage, PixelRect)> {
    let bounds = content_bounds(img, alpha_epsilon).ok_or_else(|| {
        ForgeError::empty_subject(format!(
            "no pixel above alpha {alpha_epsilon} in {}x{} image",
            img.width(),
            img.height()
        ))
    })?;
    let cropped =
        image::imageops::crop_imm(img, bounds.x, bounds.y, bounds.width, bounds.height).to_image();
    Ok((cropped, bounds))
}

/// Scale a cropped sprite so its height is exactly `height_cm * pixels_per_cm`.
///
/// Width follows the aspect ratio (rounded, at least 1 px). Resampling runs on premultiplied
/// pixels so transparent neighbours do not bleed color into the silhouette.
pub fn calibrate_height(
    sprite: &RgbaImage,
    height_cm: u32,
    pixels_per_cm: u32,
) -> ForgeResult<RgbaImage> {
    validate_height_cm(height_cm)?;
    if !(1..=MAX_PIXELS_PER_CM).contains(&pixels_per_cm) {
        return Err(ForgeError::validation(format!(
            "pixels_per_cm must be within 1..={MAX_PIXELS_PER_CM}, got {pixels_per_cm}"
        )));
    }
    let (w, h) = sprite.dimensions();
    if w == 0 || h == 0 {
        return Err(ForgeError::empty_subject("cannot calibrate an empty sprite"));
    }

    let target_h = height_cm
        .checked_mul(pixels_per_cm)
        .ok_or_else(|| ForgeError::validation("calibrated sprite height overflows"))?;
    let target_w = (f64::from(w) * f64::from(target_h) / f64::from(h)).round();
    if target_w > f64::from(MAX_SPRITE_WIDTH_PX) {
        return Err(ForgeError::validation(format!(
            "calibrated sprite would be {target_w} px wide (max {MAX_SPRITE_WIDTH_PX})"
        )));
    }
    let target_w = (target_w as u32).max(1);

    if (target_w, target_h) == (w, h) {
        return Ok(sprite.clone());
    }

    let mut premul = sprite.clone();
    premultiply_in_place(&mut premul);
    let mut scaled = image::imageops::resize(&premul, target_w, target_h, FilterType::Lanczos3);
    clamp_premultiplied(&mut scaled);
    unpremultiply_in_place(&mut scaled);
    Ok(scaled)
}

/// Place `sprite` above an opaque name plate on a transparent canvas.
///
/// The canvas is `label_band_px` taller than the sprite and wide enough for the measured ink of
/// the name plus `label_padding_px` on each side. Returns the canvas and the sprite's rectangle
/// inside it.
pub fn attach_name_plate(
    sprite: &RgbaImage,
    name: &str,
    cfg: &CompositorConfig,
) -> ForgeResult<(RgbaImage, PixelRect)> {
    let (sw, sh) = sprite.dimensions();
    let pad = cfg.label_padding_px;
    let text_w = label_width(name, cfg.label_font_px)?;
    let canvas_w = sw
        .max(text_w)
        .checked_add(pad.saturating_mul(2))
        .ok_or_else(|| ForgeError::validation(format!("name plate for '{name}' is too wide")))?;
    let canvas_h = sh
        .checked_add(cfg.label_band_px)
        .ok_or_else(|| ForgeError::validation("sprite plus label band is too tall"))?;

    let mut canvas = RgbaImage::new(canvas_w, canvas_h);
    let sprite_x = (canvas_w - sw) / 2;
    paste_replace(&mut canvas, sprite, sprite_x, 0)?;

    let plate = render_name_plate(name, canvas_w, cfg.label_band_px, cfg.label_font_px)?;
    paste_replace(&mut canvas, &plate, 0, sh)?;

    Ok((canvas, PixelRect::new(sprite_x, 0, sw, sh)))
}

/// Run the full compositor on one raw render.
///
/// Fails with [`ForgeError::EmptySubject`] when key removal leaves nothing, and with
/// [`ForgeError::ClippedSubject`] when the subject touches all four image edges.
#[tracing::instrument(skip(raw, cfg), fields(w = raw.width(), h = raw.height()))]
pub fn process_character(
    name: &str,
    height_cm: u32,
    raw: &RgbaImage,
    cfg: &CompositorConfig,
) -> ForgeResult<CharacterReference> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ForgeError::validation("character name must be non-empty"));
    }
    validate_height_cm(height_cm)?;
    cfg.validate()?;

    let keyed = remove_key(raw, cfg);
    let (cropped, bounds) = crop_to_content(&keyed, cfg.alpha_epsilon)
        .map_err(|e| match e {
            ForgeError::EmptySubject(msg) => {
                ForgeError::empty_subject(format!("'{name}': {msg}"))
            }
            other => other,
        })?;
    if bounds.touches_all_edges(raw.width(), raw.height()) {
        return Err(ForgeError::clipped_subject(format!(
            "'{name}': subject spans the whole {}x{} frame",
            raw.width(),
            raw.height()
        )));
    }
    tracing::debug!(?bounds, "cropped subject");

    let sprite = calibrate_height(&cropped, height_cm, cfg.pixels_per_cm)?;
    let (processed, sprite_rect) = attach_name_plate(&sprite, name, cfg)?;
    tracing::debug!(
        sprite_w = sprite_rect.width,
        sprite_h = sprite_rect.height,
        canvas_w = processed.width(),
        canvas_h = processed.height(),
        "calibrated reference"
    );

    Ok(CharacterReference {
        name: name.to_string(),
        height_cm,
        raw_image: Arc::new(raw.clone()),
        processed_image: Arc::new(processed),
        pixels_per_cm: cfg.pixels_per_cm,
        sprite_rect,
    })
}

pub fn validate_height_cm(height_cm: u32) -> ForgeResult<()> {
    if !(MIN_HEIGHT_CM..=MAX_HEIGHT_CM).contains(&height_cm) {
        return Err(ForgeError::validation(format!(
            "character height must be {MIN_HEIGHT_CM}-{MAX_HEIGHT_CM} cm, got {height_cm}"
        )));
    }
    Ok(())
}

// Lanczos ringing can push a color channel above its alpha.
fn clamp_premultiplied(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        let a = px.0[3];
        for c in &mut px.0[..3] {
            *c = (*c).min(a);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/chroma.rs"]
mod tests;
