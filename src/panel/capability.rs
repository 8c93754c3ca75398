//! Interfaces to the two external capabilities the feedback loop drives.
//!
//! Both traits have exactly one method so tests can substitute fixed-response fakes.
use std::time::Duration;

use image::{RgbImage, RgbaImage};

use crate::{
    foundation::core::AspectRatio,
    panel::{
        model::Verdict,
        prompt::{CritiquePrompt, GenerationPrompt},
    },
};

/// Capability name used in errors and step logs.
pub const GENERATOR: &str = "generator";
/// Capability name used in errors and step logs.
pub const CRITIC: &str = "critic";

/// Flavor of a retryable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Timeout,
    RateLimited,
    Network,
}

/// Failure reported by a capability implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Worth retrying the same call.
    #[error("transient {kind:?}: {message}")]
    Transient { kind: TransientKind, message: String },
    /// Content-policy refusal; no amount of feedback fixes it.
    #[error("content policy violation: {0}")]
    PolicyViolation(String),
    /// Anything else that will not improve on retry.
    #[error("{0}")]
    Fatal(String),
}

impl CapabilityError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::Timeout,
            message: msg.into(),
        }
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::RateLimited,
            message: msg.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Transient {
            kind: TransientKind::Network,
            message: msg.into(),
        }
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Everything the generator gets for one attempt.
#[derive(Clone, Copy, Debug)]
pub struct GeneratorRequest<'a> {
    /// 1-based iteration number.
    pub iteration: u32,
    /// 1-based attempt within the iteration (transient retries).
    pub attempt: u32,
    /// Instruction text plus the multi-turn feedback transcript.
    pub prompt: &'a GenerationPrompt,
    pub lineup: Option<&'a RgbaImage>,
    pub location: Option<&'a RgbImage>,
    pub aspect_ratio: AspectRatio,
    /// Deadline the implementation must enforce; exceeding it is a [`TransientKind::Timeout`].
    pub timeout: Duration,
}

/// One image produced by the generator.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub image: RgbaImage,
    /// Optional text the model returned alongside the image.
    pub description: Option<String>,
    /// Raw response payload kept for the step log.
    pub raw_response: Option<serde_json::Value>,
}

impl GeneratedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            description: None,
            raw_response: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything the critic gets for one attempt.
#[derive(Clone, Copy, Debug)]
pub struct CritiqueRequest<'a> {
    pub iteration: u32,
    pub attempt: u32,
    pub candidate: &'a RgbaImage,
    /// Scene, fixed rubric and reply format.
    pub prompt: &'a CritiquePrompt,
    pub timeout: Duration,
}

/// Critic decision. `feedback` is expected iff the verdict is a rejection.
#[derive(Clone, Debug, PartialEq)]
pub struct Critique {
    pub verdict: Verdict,
    pub feedback: Option<String>,
    /// Raw critic reply kept for the step log.
    pub raw_response: Option<String>,
}

impl Critique {
    pub fn accept() -> Self {
        Self {
            verdict: Verdict::Accepted,
            feedback: None,
            raw_response: None,
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Rejected,
            feedback: Some(feedback.into()),
            raw_response: None,
        }
    }

    /// Strict verdict from a graded score (`score >= threshold` accepts).
    pub fn from_score(score: f32, threshold: f32, feedback: impl Into<String>) -> Self {
        match Verdict::from_score(score, threshold) {
            Verdict::Accepted => Self::accept(),
            Verdict::Rejected => Self::reject(feedback),
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }
}

/// Image-generation capability.
pub trait Generator {
    fn generate(&mut self, request: &GeneratorRequest<'_>) -> Result<GeneratedImage, CapabilityError>;
}

/// Critique capability.
pub trait Critic {
    fn critique(&mut self, request: &CritiqueRequest<'_>) -> Result<Critique, CapabilityError>;
}

impl<G: Generator + ?Sized> Generator for &mut G {
    fn generate(&mut self, request: &GeneratorRequest<'_>) -> Result<GeneratedImage, CapabilityError> {
        (**self).generate(request)
    }
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&mut self, request: &GeneratorRequest<'_>) -> Result<GeneratedImage, CapabilityError> {
        (**self).generate(request)
    }
}

impl<C: Critic + ?Sized> Critic for &mut C {
    fn critique(&mut self, request: &CritiqueRequest<'_>) -> Result<Critique, CapabilityError> {
        (**self).critique(request)
    }
}

impl<C: Critic + ?Sized> Critic for Box<C> {
    fn critique(&mut self, request: &CritiqueRequest<'_>) -> Result<Critique, CapabilityError> {
        (**self).critique(request)
    }
}

/// Parse the textual critic reply format:
///
/// ```text
/// ACCEPTABLE: YES|NO
/// FEEDBACK: free text, may span several lines
/// ```
///
/// A reply without an `ACCEPTABLE:` line is malformed and reported as [`CapabilityError::Fatal`].
pub fn parse_critique_text(text: &str) -> Result<Critique, CapabilityError> {
    let mut verdict = None;
    let mut feedback_lines: Vec<&str> = Vec::new();
    let mut in_feedback = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_label(trimmed, "ACCEPTABLE:") {
            let answer =
                rest.trim_matches(|c: char| c == '[' || c == ']' || c == '*' || c.is_whitespace());
            verdict = match answer.to_ascii_uppercase().as_str() {
                a if a.starts_with("YES") => Some(Verdict::Accepted),
                a if a.starts_with("NO") => Some(Verdict::Rejected),
                _ => {
                    return Err(CapabilityError::fatal(format!(
                        "critic reply has unreadable verdict '{answer}'"
                    )));
                }
            };
            in_feedback = false;
        } else if let Some(rest) = strip_label(trimmed, "FEEDBACK:") {
            in_feedback = true;
            feedback_lines.push(rest.trim());
        } else if in_feedback {
            feedback_lines.push(trimmed);
        }
    }

    let verdict = verdict
        .ok_or_else(|| CapabilityError::fatal("critic reply lacks an 'ACCEPTABLE:' line"))?;
    let feedback = feedback_lines.join("\n").trim().to_string();

    let critique = match verdict {
        Verdict::Accepted => Critique::accept(),
        Verdict::Rejected => Critique::reject(feedback),
    };
    Ok(critique.with_raw(text))
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line.trim_start_matches(['*', '#', ' ']);
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        line.get(label.len()..)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "../../tests/unit/panel/capability.rs"]
mod tests;
