//! Chroma Compositor and the pixel helpers it is built from.

/// Key removal, cropping, height calibration and the full per-character pipeline.
pub mod chroma;
/// Solid key-color backdrops.
pub mod greenscreen;
/// Name plate rasterization.
pub mod label;
pub(crate) mod pixel;
