use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::Context as _;

use crate::foundation::{
    core::{MAX_LABEL_PX, MAX_PIXELS_PER_CM, PIXELS_PER_CM, Rgb8},
    error::{ForgeError, ForgeResult},
};

/// Top-level configuration for a panelforge pipeline.
///
/// Every section falls back to its defaults, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Chroma Compositor tuning.
    pub compositor: CompositorConfig,
    /// Reference Assembler layout.
    pub lineup: LineupConfig,
    /// Feedback Loop Controller retry and timeout policy.
    pub feedback: FeedbackConfig,
    /// Worker count for per-character compositing (`None` = rayon default).
    pub threads: Option<usize>,
}

impl ForgeConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> ForgeResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: ForgeConfig = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| ForgeError::serde(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ForgeResult<()> {
        self.compositor.validate()?;
        self.feedback.validate()?;
        if self.threads == Some(0) {
            return Err(ForgeError::validation("threads must be >= 1 when set"));
        }
        Ok(())
    }
}

/// Key removal, crop, calibration and label settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Calibration resolution; a sprite for `h` cm is exactly `h * pixels_per_cm` pixels tall.
    pub pixels_per_cm: u32,
    /// Backdrop color the upstream render was drawn on.
    pub key_color: Rgb8,
    /// Pixels closer than this RGB distance to the key become fully transparent.
    pub transparent_below: f32,
    /// Pixels at least this far from the key stay fully opaque.
    pub opaque_above: f32,
    /// Alpha at or below this value does not count as content when cropping.
    pub alpha_epsilon: u8,
    /// Clamp the key-dominant channel of edge pixels to remove color spill.
    pub despill: bool,
    /// Height of the name plate drawn under every sprite.
    pub label_band_px: u32,
    /// Font size of the name plate text.
    pub label_font_px: u32,
    /// Minimum horizontal margin around the sprite and the name.
    pub label_padding_px: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            pixels_per_cm: PIXELS_PER_CM,
            key_color: Rgb8::KEY_GREEN,
            transparent_below: 60.0,
            opaque_above: 140.0,
            alpha_epsilon: 8,
            despill: true,
            label_band_px: 100,
            label_font_px: 60,
            label_padding_px: 10,
        }
    }
}

impl CompositorConfig {
    pub fn validate(&self) -> ForgeResult<()> {
        if !(1..=MAX_PIXELS_PER_CM).contains(&self.pixels_per_cm) {
            return Err(ForgeError::validation(format!(
                "pixels_per_cm must be within 1..={MAX_PIXELS_PER_CM}, got {}",
                self.pixels_per_cm
            )));
        }
        if !self.transparent_below.is_finite()
            || !self.opaque_above.is_finite()
            || self.transparent_below < 0.0
            || self.transparent_below > self.opaque_above
        {
            return Err(ForgeError::validation(
                "key thresholds must satisfy 0 <= transparent_below <= opaque_above",
            ));
        }
        if self.alpha_epsilon == u8::MAX {
            return Err(ForgeError::validation("alpha_epsilon must be < 255"));
        }
        if self.label_band_px == 0 || self.label_font_px == 0 {
            return Err(ForgeError::validation(
                "label_band_px and label_font_px must be >= 1",
            ));
        }
        if self.label_band_px > MAX_LABEL_PX || self.label_padding_px > MAX_LABEL_PX {
            return Err(ForgeError::validation(format!(
                "label_band_px and label_padding_px must be <= {MAX_LABEL_PX}"
            )));
        }
        if self.label_font_px > self.label_band_px {
            return Err(ForgeError::validation(
                "label_font_px must not exceed label_band_px",
            ));
        }
        Ok(())
    }
}

/// Vertical placement of sprites inside the lineup canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineupAlignment {
    /// Feet on a shared baseline (the calibrated layout).
    #[default]
    Bottom,
    /// Heads on the top margin.
    Top,
    /// Vertically centered.
    Center,
}

/// Reference Assembler layout settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LineupConfig {
    /// Horizontal gap between neighbouring references.
    pub padding_px: u32,
    /// Distance between the baseline and the canvas bottom.
    pub baseline_margin_px: u32,
    pub alignment: LineupAlignment,
    /// Optional opaque background (straight RGBA8) under the sprites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_rgba: Option<[u8; 4]>,
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            padding_px: 40,
            baseline_margin_px: 20,
            alignment: LineupAlignment::Bottom,
            background_rgba: None,
        }
    }
}

/// Feedback Loop Controller policy.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Extra attempts allowed for a step that failed transiently.
    pub max_transient_retries: u32,
    /// Base delay between transient retries; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Per-call timeout forwarded to every capability request.
    pub call_timeout_ms: u64,
    /// Minimum graded critic score that counts as acceptance.
    pub accept_score_threshold: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: 3,
            retry_backoff_ms: 500,
            call_timeout_ms: 120_000,
            accept_score_threshold: 0.8,
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> ForgeResult<()> {
        if self.call_timeout_ms == 0 {
            return Err(ForgeError::validation("call_timeout_ms must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.accept_score_threshold) {
            return Err(ForgeError::validation(
                "accept_score_threshold must be within [0, 1]",
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
