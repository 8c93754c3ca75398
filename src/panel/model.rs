use std::{collections::BTreeSet, sync::Arc};

use image::{RgbImage, RgbaImage};

use crate::foundation::{
    core::{AspectRatio, PixelRect},
    error::{ForgeError, ForgeResult},
};

/// Scene prompt length bounds, in characters.
pub const SCENE_PROMPT_CHARS: std::ops::RangeInclusive<usize> = 10..=500;
/// Maximum number of characters in one panel.
pub const MAX_CHARACTERS: usize = 7;
/// Iteration budget bounds for one panel attempt.
pub const MAX_ITERATIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=5;
/// Iteration budget used when the caller does not choose one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// A height-calibrated, background-free character reference.
///
/// Produced by [`crate::process_character`]; immutable afterwards.
#[derive(Clone, Debug)]
pub struct CharacterReference {
    /// Display name, unique within a panel request.
    pub name: String,
    /// Real-world height in centimeters.
    pub height_cm: u32,
    /// The render as received, key-color backdrop included.
    pub raw_image: Arc<RgbaImage>,
    /// Tight sprite plus name plate on a transparent canvas.
    pub processed_image: Arc<RgbaImage>,
    /// Calibration resolution the sprite was scaled with.
    pub pixels_per_cm: u32,
    /// Where the calibrated sprite sits inside `processed_image`.
    pub sprite_rect: PixelRect,
}

impl CharacterReference {
    /// Calibrated sprite height, always `height_cm * pixels_per_cm`.
    pub fn sprite_height_px(&self) -> u32 {
        self.sprite_rect.height
    }
}

/// Background scene for a panel. Read-only, never carries characters.
#[derive(Clone, Debug)]
pub struct LocationBackdrop {
    pub image: Arc<RgbImage>,
}

impl LocationBackdrop {
    /// Wrap a landscape RGB image.
    pub fn new(image: RgbImage) -> ForgeResult<Self> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(ForgeError::validation("location image must be non-empty"));
        }
        if w <= h {
            return Err(ForgeError::validation(format!(
                "location image must be landscape, got {w}x{h}"
            )));
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Drop any alpha channel from a decoded image and wrap it.
    pub fn from_dynamic(image: &image::DynamicImage) -> ForgeResult<Self> {
        Self::new(image.to_rgb8())
    }
}

/// One panel attempt: scene, cast, optional location and budget.
#[derive(Clone, Debug)]
pub struct PanelRequest {
    pub scene_prompt: String,
    /// Lineup order, left to right.
    pub characters: Vec<CharacterReference>,
    pub location: Option<LocationBackdrop>,
    pub aspect_ratio: AspectRatio,
    pub max_iterations: u32,
}

impl PanelRequest {
    pub fn new(scene_prompt: impl Into<String>) -> Self {
        Self {
            scene_prompt: scene_prompt.into(),
            characters: Vec::new(),
            location: None,
            aspect_ratio: AspectRatio::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_characters(mut self, characters: Vec<CharacterReference>) -> Self {
        self.characters = characters;
        self
    }

    pub fn with_location(mut self, location: LocationBackdrop) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Reject malformed requests before any external call is made.
    pub fn validate(&self) -> ForgeResult<()> {
        let prompt_chars = self.scene_prompt.trim().chars().count();
        if !SCENE_PROMPT_CHARS.contains(&prompt_chars) {
            return Err(ForgeError::validation(format!(
                "scene prompt must be {}-{} characters, got {prompt_chars}",
                SCENE_PROMPT_CHARS.start(),
                SCENE_PROMPT_CHARS.end()
            )));
        }
        if self.characters.len() > MAX_CHARACTERS {
            return Err(ForgeError::validation(format!(
                "at most {MAX_CHARACTERS} characters per panel, got {}",
                self.characters.len()
            )));
        }
        if !MAX_ITERATIONS_RANGE.contains(&self.max_iterations) {
            return Err(ForgeError::validation(format!(
                "max_iterations must be within {}..={}, got {}",
                MAX_ITERATIONS_RANGE.start(),
                MAX_ITERATIONS_RANGE.end(),
                self.max_iterations
            )));
        }
        if self.characters.is_empty() && self.location.is_none() {
            return Err(ForgeError::validation(
                "a panel needs a character lineup, a location, or both",
            ));
        }

        let mut seen = BTreeSet::new();
        for c in &self.characters {
            if !seen.insert(c.name.as_str()) {
                return Err(ForgeError::validation(format!(
                    "duplicate character name '{}'",
                    c.name
                )));
            }
        }
        Ok(())
    }
}

/// Strict critic decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected,
}

impl Verdict {
    /// Map a graded critic score onto the strict verdict; `score >= threshold` accepts.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score.is_finite() && score >= threshold {
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }
}

/// A generated panel image plus its textual summary for the feedback transcript.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub image: Arc<RgbaImage>,
    pub summary: String,
}

/// One completed generate/critique round. Append-only; never mutated after creation.
#[derive(Clone, Debug)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub index: u32,
    pub candidate: Candidate,
    pub verdict: Verdict,
    /// Critic feedback; present only when rejected.
    pub feedback: Option<String>,
}

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The critic accepted the last candidate.
    Accepted,
    /// The iteration budget ran out without acceptance.
    Exhausted,
    /// Cancellation was requested between iterations.
    Cancelled,
}

/// Terminal artifact of a panel session.
#[derive(Clone, Debug)]
pub struct PanelResult {
    /// Timestamp-derived identifier of the session that produced this result.
    pub session_id: String,
    /// Candidate from the last completed iteration.
    pub final_image: Arc<RgbaImage>,
    pub iterations_used: u32,
    pub accepted: bool,
    pub termination: Termination,
    pub history: Vec<IterationRecord>,
}

#[cfg(test)]
#[path = "../../tests/unit/panel/model.rs"]
mod tests;
