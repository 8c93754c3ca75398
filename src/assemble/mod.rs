//! Reference Assembler.

/// Parallel per-character compositing.
pub mod batch;
/// Side-by-side lineup and generator input bundle.
pub mod lineup;
