use image::RgbaImage;

use crate::foundation::error::{ForgeError, ForgeResult};

pub type PremulRgba8 = [u8; 4];

/// Source-over for premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    if a == 0 {
        return [0, 0, 0, 0];
    }
    [
        mul_div255(u16::from(px[0]), a),
        mul_div255(u16::from(px[1]), a),
        mul_div255(u16::from(px[2]), a),
        px[3],
    ]
}

pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = u32::from(px[3]);
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let un = |c: u8| ((u32::from(c) * 255 + a / 2) / a).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), px[3]]
}

pub fn premultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let out = premultiply([px[0], px[1], px[2], px[3]]);
        px.copy_from_slice(&out);
    }
}

pub fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let out = unpremultiply([px[0], px[1], px[2], px[3]]);
        px.copy_from_slice(&out);
    }
}

/// Copy `src` into `dst` at `(x, y)`, replacing destination pixels.
pub fn paste_replace(dst: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) -> ForgeResult<()> {
    check_fits(dst, src, x, y)?;
    for (sx, sy, px) in src.enumerate_pixels() {
        dst.put_pixel(x + sx, y + sy, *px);
    }
    Ok(())
}

/// Blend straight-alpha `src` over straight-alpha `dst` at `(x, y)`.
pub fn paste_over(dst: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) -> ForgeResult<()> {
    check_fits(dst, src, x, y)?;
    for (sx, sy, px) in src.enumerate_pixels() {
        if px.0[3] == 0 {
            continue;
        }
        let d = dst.get_pixel_mut(x + sx, y + sy);
        let blended = over(premultiply(d.0), premultiply(px.0));
        d.0 = unpremultiply(blended);
    }
    Ok(())
}

fn check_fits(dst: &RgbaImage, src: &RgbaImage, x: u32, y: u32) -> ForgeResult<()> {
    let fits_x = x.checked_add(src.width()).is_some_and(|r| r <= dst.width());
    let fits_y = y.checked_add(src.height()).is_some_and(|b| b <= dst.height());
    if !fits_x || !fits_y {
        return Err(ForgeError::validation(format!(
            "paste of {}x{} at ({x},{y}) exceeds {}x{} canvas",
            src.width(),
            src.height(),
            dst.width(),
            dst.height()
        )));
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/composite/pixel.rs"]
mod tests;
