use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::{
    composite::pixel::{paste_over, paste_replace},
    foundation::{
        config::{LineupAlignment, LineupConfig},
        core::PixelRect,
        error::{ForgeError, ForgeResult},
    },
    panel::model::{CharacterReference, LocationBackdrop, PanelRequest},
};

/// Placement of one reference inside a [`ReferenceLineup`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct LineupSlot {
    pub name: String,
    pub height_cm: u32,
    /// Where the whole processed reference (sprite + name plate) was pasted.
    pub placed: PixelRect,
    /// Where the calibrated sprite ended up, in lineup coordinates.
    pub sprite: PixelRect,
}

/// Side-by-side composite of calibrated references, recomputed whenever the cast changes.
#[derive(Clone, Debug)]
pub struct ReferenceLineup {
    pub image: Arc<RgbaImage>,
    /// One slot per input reference, in input order.
    pub slots: Vec<LineupSlot>,
    pub pixels_per_cm: u32,
    /// Row every sprite's feet rest on (exclusive bottom of the sprites) in bottom alignment.
    pub baseline_y: u32,
}

impl ReferenceLineup {
    pub fn slot(&self, name: &str) -> Option<&LineupSlot> {
        self.slots.iter().find(|s| s.name == name)
    }
}

/// Everything the generator receives besides text: the lineup and the location, either optional.
#[derive(Clone, Debug, Default)]
pub struct PanelInputs {
    pub lineup: Option<ReferenceLineup>,
    pub location: Option<LocationBackdrop>,
}

/// Concatenate calibrated references left to right on a shared baseline.
///
/// Order is preserved and names are not deduplicated. Inputs are not modified. All references
/// must share one `pixels_per_cm`, otherwise their heights would not be comparable.
pub fn assemble_lineup(
    refs: &[CharacterReference],
    cfg: &LineupConfig,
) -> ForgeResult<ReferenceLineup> {
    let first = refs
        .first()
        .ok_or_else(|| ForgeError::validation("lineup needs at least one character"))?;
    let pixels_per_cm = first.pixels_per_cm;
    if let Some(odd) = refs.iter().find(|r| r.pixels_per_cm != pixels_per_cm) {
        return Err(ForgeError::validation(format!(
            "'{}' was calibrated at {} px/cm but the lineup uses {pixels_per_cm} px/cm",
            odd.name, odd.pixels_per_cm
        )));
    }

    // Feet line = lowest sprite bottom; everything below it (name plates) hangs under it.
    let feet_line = refs.iter().map(|r| r.sprite_rect.bottom()).max().unwrap_or(0);
    let below_feet = refs
        .iter()
        .map(|r| r.processed_image.height().saturating_sub(r.sprite_rect.bottom()))
        .max()
        .unwrap_or(0);
    let content_h = feet_line + below_feet;
    let canvas_h = content_h + cfg.baseline_margin_px;

    let gaps = cfg.padding_px.saturating_mul(refs.len() as u32 - 1);
    let canvas_w = refs
        .iter()
        .map(|r| r.processed_image.width())
        .try_fold(gaps, u32::checked_add)
        .ok_or_else(|| ForgeError::validation("lineup width overflow"))?;

    let mut canvas = match cfg.background_rgba {
        Some(bg) => RgbaImage::from_pixel(canvas_w, canvas_h, Rgba(bg)),
        None => RgbaImage::new(canvas_w, canvas_h),
    };

    let mut slots = Vec::with_capacity(refs.len());
    let mut x = 0u32;
    for r in refs {
        let img = r.processed_image.as_ref();
        let y = match cfg.alignment {
            LineupAlignment::Bottom => feet_line - r.sprite_rect.bottom(),
            LineupAlignment::Top => 0,
            LineupAlignment::Center => (content_h - img.height()) / 2,
        };

        if cfg.background_rgba.is_some() {
            paste_over(&mut canvas, img, x, y)?;
        } else {
            paste_replace(&mut canvas, img, x, y)?;
        }

        slots.push(LineupSlot {
            name: r.name.clone(),
            height_cm: r.height_cm,
            placed: PixelRect::new(x, y, img.width(), img.height()),
            sprite: PixelRect::new(
                x + r.sprite_rect.x,
                y + r.sprite_rect.y,
                r.sprite_rect.width,
                r.sprite_rect.height,
            ),
        });
        x += img.width() + cfg.padding_px;
    }

    tracing::debug!(
        characters = refs.len(),
        width = canvas_w,
        height = canvas_h,
        "assembled lineup"
    );

    Ok(ReferenceLineup {
        image: Arc::new(canvas),
        slots,
        pixels_per_cm,
        baseline_y: feet_line,
    })
}

/// Build the generator input bundle for a request: lineup (when there are characters) and
/// location (when given).
pub fn assemble_inputs(request: &PanelRequest, cfg: &LineupConfig) -> ForgeResult<PanelInputs> {
    let lineup = if request.characters.is_empty() {
        None
    } else {
        Some(assemble_lineup(&request.characters, cfg)?)
    };
    Ok(PanelInputs {
        lineup,
        location: request.location.clone(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/lineup.rs"]
mod tests;
