//! panelforge turns raw character renders into scale-accurate references and drives an external
//! image generator through a critique loop until it produces an acceptable comic panel.
//!
//! - [`process_character`] removes the key-color backdrop, crops, calibrates the sprite height to
//!   `height_cm * pixels_per_cm` and attaches a name plate.
//! - [`assemble_lineup`] places calibrated references side by side on a shared baseline.
//! - [`PanelSession`] / [`generate_panel`] run the generator-critic loop against any
//!   [`Generator`] and [`Critic`] implementation, persisting every step to an [`ArtifactSink`].
#![forbid(unsafe_code)]

pub mod artifacts;
pub mod assemble;
pub mod composite;
pub mod foundation;
pub mod panel;

pub use crate::artifacts::store::{
    ArtifactSink, FsArtifactStore, MemoryArtifactStore, StepOutcome, StepRecord, new_session_id,
};
pub use crate::assemble::batch::{CharacterRender, process_all_characters, process_characters};
pub use crate::assemble::lineup::{
    LineupSlot, PanelInputs, ReferenceLineup, assemble_inputs, assemble_lineup,
};
pub use crate::composite::chroma::{
    attach_name_plate, calibrate_height, content_bounds, crop_to_content, process_character,
    remove_key,
};
pub use crate::composite::greenscreen::green_screen;
pub use crate::foundation::config::{
    CompositorConfig, FeedbackConfig, ForgeConfig, LineupAlignment, LineupConfig,
};
pub use crate::foundation::core::{AspectRatio, Orientation, PIXELS_PER_CM, PixelRect, Rgb8};
pub use crate::foundation::error::{ForgeError, ForgeResult};
pub use crate::panel::cancel::CancelToken;
pub use crate::panel::capability::{
    CapabilityError, Critic, Critique, CritiqueRequest, GeneratedImage, Generator,
    GeneratorRequest, TransientKind, parse_critique_text,
};
pub use crate::panel::controller::{PanelSession, SessionState, generate_panel};
pub use crate::panel::model::{
    Candidate, CharacterReference, IterationRecord, LocationBackdrop, PanelRequest, PanelResult,
    Termination, Verdict,
};
pub use crate::panel::prompt::{
    CritiquePrompt, GenerationPrompt, TranscriptTurn, build_critique_prompt,
    build_generation_prompt,
};
