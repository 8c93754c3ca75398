//! Panel data model and the generator-critic feedback loop.

/// Cooperative cancellation.
pub mod cancel;
/// Generator and critic capability interfaces.
pub mod capability;
/// Feedback Loop Controller.
pub mod controller;
/// Requests, references, iteration history and results.
pub mod model;
/// Prompt/Context Assembler.
pub mod prompt;
