use std::sync::{Arc, OnceLock};

use anyhow::Context as _;
use image::RgbaImage;

use crate::{
    composite::pixel::unpremultiply_in_place,
    foundation::error::{ForgeError, ForgeResult},
};

const PLATE_FILL: &str = "#ffffff";
const TEXT_FILL: &str = "#000000";
// Concrete families first; fontdb resolves the generic `sans-serif` to Arial only.
const FONT_FAMILIES: &str =
    "'DejaVu Sans', 'Liberation Sans', Arial, Helvetica, 'Noto Sans', sans-serif";
// Average advance of a bold sans-serif glyph relative to the font size.
const GLYPH_ADVANCE_EM: f32 = 0.62;

/// Horizontal ink extent of a rendered label, relative to the text origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextExtent {
    pub x: f32,
    pub width: f32,
}

impl TextExtent {
    /// Whole pixels needed to hold the ink.
    pub fn width_px(self) -> u32 {
        self.width.ceil().max(0.0) as u32
    }
}

/// Measure the ink of `text` at `font_px` with the label font stack.
///
/// Returns `None` when no installed font produces glyphs for the text.
pub fn measure_text(text: &str, font_px: u32) -> ForgeResult<Option<TextExtent>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let scratch_w = estimated_text_width(text, font_px)
        .saturating_mul(2)
        .saturating_add(font_px)
        .max(1);
    let scratch_h = font_px.saturating_mul(2).max(1);
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">"#,
            r#"<text x="0" y="{fs}" font-family="{family}" font-weight="bold" font-size="{fs}">"#,
            "{text}</text></svg>"
        ),
        w = scratch_w,
        h = scratch_h,
        fs = font_px,
        family = FONT_FAMILIES,
        text = escape_xml(text),
    );
    let tree = parse_label_svg(&svg)?;
    if !tree.root().has_children() {
        return Ok(None);
    }
    let bbox = tree.root().abs_bounding_box();
    if !bbox.width().is_finite() || bbox.width() <= 0.0 {
        return Ok(None);
    }
    Ok(Some(TextExtent {
        x: bbox.x(),
        width: bbox.width(),
    }))
}

/// Width a name plate needs to hold `text` at `font_px`, excluding padding.
///
/// Falls back to an average-advance estimate when no font resolves; nothing is drawn then.
pub fn label_width(text: &str, font_px: u32) -> ForgeResult<u32> {
    Ok(match measure_text(text, font_px)? {
        Some(extent) => extent.width_px(),
        None => estimated_text_width(text, font_px),
    })
}

fn estimated_text_width(text: &str, font_px: u32) -> u32 {
    let chars = text.chars().count() as f32;
    (chars * font_px as f32 * GLYPH_ADVANCE_EM).ceil() as u32
}

/// Rasterize an opaque name plate of `width` x `height` with `name` centered in black bold text.
///
/// The ink is centered from its measured extent, so a plate at least
/// [`label_width`] wide keeps every glyph inside. The plate is always opaque; glyphs are drawn
/// only when a system font resolves.
pub fn render_name_plate(name: &str, width: u32, height: u32, font_px: u32) -> ForgeResult<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(ForgeError::validation("name plate must be non-empty"));
    }

    let baseline = height as f32 / 2.0 + font_px as f32 * 0.35;
    let text_x = match measure_text(name, font_px)? {
        Some(extent) => (width as f32 - extent.width) / 2.0 - extent.x,
        None => width as f32 / 2.0,
    };
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{plate}"/>"#,
            r#"<text x="{tx}" y="{by}" font-family="{family}" font-weight="bold" font-size="{fs}" "#,
            r#"fill="{ink}">{text}</text>"#,
            "</svg>"
        ),
        w = width,
        h = height,
        plate = PLATE_FILL,
        tx = text_x,
        by = baseline,
        family = FONT_FAMILIES,
        fs = font_px,
        ink = TEXT_FILL,
        text = escape_xml(name),
    );
    let tree = parse_label_svg(&svg)?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ForgeError::validation("failed to allocate name plate pixmap"))?;
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let mut data = pixmap.take();
    unpremultiply_in_place(&mut data);
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| ForgeError::validation("name plate buffer size mismatch"))
}

fn parse_label_svg(svg: &str) -> ForgeResult<usvg::Tree> {
    let opts = usvg::Options {
        fontdb: label_fontdb(),
        ..Default::default()
    };
    Ok(usvg::Tree::from_str(svg, &opts).context("parse name plate svg")?)
}

fn label_fontdb() -> Arc<usvg::fontdb::Database> {
    static DB: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    DB.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded label fonts");
        Arc::new(db)
    })
    .clone()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/composite/label.rs"]
mod tests;
