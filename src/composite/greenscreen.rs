use image::{Rgb, RgbImage};

use crate::foundation::{
    core::Rgb8,
    error::{ForgeError, ForgeResult},
};

/// Solid key-color canvas handed to the character render as its backdrop.
pub fn green_screen(width: u32, height: u32, key: Rgb8) -> ForgeResult<RgbImage> {
    if width == 0 || height == 0 {
        return Err(ForgeError::validation(format!(
            "green screen must be non-empty, got {width}x{height}"
        )));
    }
    Ok(RgbImage::from_pixel(width, height, Rgb(key.to_array())))
}
