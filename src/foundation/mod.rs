/// Serde configuration sections and their validation.
pub mod config;
/// Pixel geometry, key color, aspect ratios and calibration constants.
pub mod core;
/// Crate-wide error taxonomy.
pub mod error;
