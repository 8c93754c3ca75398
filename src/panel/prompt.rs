//! Prompt/Context Assembler.
//!
//! Pure functions of the request, the assembled inputs and the iteration history. No I/O, no
//! session state: the controller hands the full append-only history in on every call.
use image::RgbaImage;

use crate::{
    assemble::lineup::PanelInputs,
    foundation::core::{AspectRatio, Orientation},
    panel::model::{IterationRecord, PanelRequest},
};

/// The fixed critique rubric, in evaluation order.
pub const RUBRIC: [&str; 6] = [
    "Scene fidelity: does the panel accurately depict the scene description?",
    "Composition: is the framing clear and effective?",
    "Character placement: are the characters placed correctly, recognizable, and at their relative heights?",
    "Background coherence: is the background or location appropriate and consistent?",
    "Technical image quality: are there visual artifacts or rendering defects?",
    "Professional polish: is the panel publication ready?",
];

const STYLE_GUIDELINES: [&str; 6] = [
    "Comic book art style",
    "Bold, clear lineart",
    "Vibrant colors",
    "Dynamic composition",
    "Professional comic book quality",
    "Clear visual storytelling",
];

const QUALITY_REQUIREMENTS: [&str; 7] = [
    "Follow the scene description accurately",
    "Proper composition and character placement",
    "Maintain consistent art style across all elements",
    "Clear visual storytelling",
    "Professional polish and finish",
    "No text or speech bubbles (will be added later)",
    "Appropriate lighting and atmosphere",
];

/// Who produced a transcript turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Generator,
    Critic,
}

/// One entry of the conversational context replayed to the generator.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TranscriptTurn {
    pub iteration: u32,
    pub role: TurnRole,
    pub text: String,
}

/// A lineup entry as named in the prompt.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CastEntry {
    pub name: String,
    pub height_cm: u32,
}

/// Generator payload for one iteration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct GenerationPrompt {
    pub scene: String,
    /// Lineup order, left to right.
    pub cast: Vec<CastEntry>,
    pub has_location: bool,
    pub aspect_ratio: AspectRatio,
    /// Prior `(candidate summary, critic feedback)` pairs, oldest first.
    pub transcript: Vec<TranscriptTurn>,
    /// Rendered instruction text.
    pub text: String,
}

/// Critic payload for one iteration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CritiquePrompt {
    pub scene: String,
    pub rubric: Vec<String>,
    pub aspect_ratio: AspectRatio,
    pub text: String,
}

/// Build the generator payload for iteration `history.len() + 1`.
pub fn build_generation_prompt(
    request: &PanelRequest,
    inputs: &PanelInputs,
    history: &[IterationRecord],
) -> GenerationPrompt {
    let scene = request.scene_prompt.trim().to_string();
    let cast: Vec<CastEntry> = match &inputs.lineup {
        Some(lineup) => lineup
            .slots
            .iter()
            .map(|s| CastEntry {
                name: s.name.clone(),
                height_cm: s.height_cm,
            })
            .collect(),
        None => request
            .characters
            .iter()
            .map(|c| CastEntry {
                name: c.name.clone(),
                height_cm: c.height_cm,
            })
            .collect(),
    };
    let has_location = inputs.location.is_some();
    let transcript = render_transcript(history);

    let mut lines = vec![
        "Generate a comic panel image with the following description:".to_string(),
        scene.clone(),
        String::new(),
        "Style guidelines:".to_string(),
    ];
    lines.extend(STYLE_GUIDELINES.iter().map(|g| format!("- {g}")));
    lines.push(String::new());
    lines.push(aspect_directive(request.aspect_ratio));

    if !cast.is_empty() {
        lines.push(String::new());
        lines.push(
            "Characters (reference lineup, left to right, drawn to scale on a shared baseline):"
                .to_string(),
        );
        lines.extend(
            cast.iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {} ({} cm)", i + 1, c.name, c.height_cm)),
        );
        lines.push(
            "Keep each character's design from the lineup and preserve their relative heights."
                .to_string(),
        );
    }
    if has_location {
        lines.push(String::new());
        lines.push("Use the location image provided as the background.".to_string());
    }

    let feedback: Vec<_> = history
        .iter()
        .filter_map(|r| r.feedback.as_deref().map(|f| (r.index, f)))
        .collect();
    if !feedback.is_empty() {
        lines.push(String::new());
        lines.push("Previous Feedback (address these issues):".to_string());
        lines.extend(
            feedback
                .iter()
                .map(|(i, f)| format!("- Iteration {i}: {f}")),
        );
    }

    lines.push(String::new());
    lines.push("Quality Requirements:".to_string());
    lines.extend(QUALITY_REQUIREMENTS.iter().map(|q| format!("- {q}")));

    GenerationPrompt {
        scene,
        cast,
        has_location,
        aspect_ratio: request.aspect_ratio,
        transcript,
        text: lines.join("\n"),
    }
}

/// Build the critic payload. The rubric never changes between iterations.
pub fn build_critique_prompt(request: &PanelRequest, iteration: u32) -> CritiquePrompt {
    let scene = request.scene_prompt.trim().to_string();
    let mut text = format!(
        "You are an expert comic book editor. Analyze this panel (attempt {iteration}) and \
         determine if it is acceptable for publication.\n\nScene Requirements: {scene}\n\
         Aspect ratio: {}\n\nEvaluate the panel on these criteria:\n",
        request.aspect_ratio
    );
    for (i, criterion) in RUBRIC.iter().enumerate() {
        text.push_str(&format!("{}. {criterion}\n", i + 1));
    }
    text.push_str(
        "\nRespond in this EXACT format:\nACCEPTABLE: [YES or NO]\n\
         FEEDBACK: [If NO, provide specific issues to fix. If YES, say \"Approved.\"]\n\n\
         Be strict but fair. Only approve panels that are truly publication-ready.",
    );

    CritiquePrompt {
        scene,
        rubric: RUBRIC.iter().map(|c| c.to_string()).collect(),
        aspect_ratio: request.aspect_ratio,
        text,
    }
}

/// Short textual stand-in for a candidate image inside the transcript.
pub fn summarize_candidate(image: &RgbaImage, description: Option<&str>) -> String {
    let fingerprint = xxhash_rust::xxh3::xxh3_64(image.as_raw());
    let base = format!(
        "candidate {}x{} #{fingerprint:016x}",
        image.width(),
        image.height()
    );
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => format!("{base}: {d}"),
        None => base,
    }
}

/// Names from the cast that the scene prompt never mentions (case-insensitive).
pub fn unreferenced_names<'a>(scene: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let scene = scene.to_lowercase();
    names
        .into_iter()
        .filter(|n| !scene.contains(&n.to_lowercase()))
        .collect()
}

fn aspect_directive(aspect: AspectRatio) -> String {
    let (w, h) = aspect.dimensions();
    let shape = match aspect.orientation() {
        Orientation::Portrait => "portrait",
        Orientation::Landscape => "landscape",
        Orientation::Square => "square",
    };
    format!("Aspect ratio: {aspect} ({shape}, {w}x{h} px).")
}

fn render_transcript(history: &[IterationRecord]) -> Vec<TranscriptTurn> {
    let mut turns = Vec::with_capacity(history.len() * 2);
    for record in history {
        turns.push(TranscriptTurn {
            iteration: record.index,
            role: TurnRole::Generator,
            text: record.candidate.summary.clone(),
        });
        let critic = match &record.feedback {
            Some(f) => format!("ACCEPTABLE: NO\nFEEDBACK: {f}"),
            None if record.verdict.is_accepted() => "ACCEPTABLE: YES\nFEEDBACK: Approved.".to_string(),
            None => "ACCEPTABLE: NO".to_string(),
        };
        turns.push(TranscriptTurn {
            iteration: record.index,
            role: TurnRole::Critic,
            text: critic,
        });
    }
    turns
}

#[cfg(test)]
#[path = "../../tests/unit/panel/prompt.rs"]
mod tests;
