//! Persisted session artifacts: reference images, candidates, step logs and metadata.
use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use image::RgbaImage;

use crate::foundation::error::{ForgeError, ForgeResult};

/// Outcome of one capability attempt, as written to the step log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Transient,
    PolicyViolation,
    Error,
}

/// Structured log entry for one generator or critic attempt.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepRecord {
    pub session_id: String,
    /// `{capability}_iter{n}_attempt{a}`.
    pub step: String,
    pub iteration: u32,
    pub attempt: u32,
    pub capability: String,
    /// RFC 3339 local time the attempt finished.
    pub timestamp: String,
    pub elapsed_ms: u64,
    pub request: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub outcome: StepOutcome,
    pub error: Option<String>,
}

impl StepRecord {
    pub fn step_name(capability: &str, iteration: u32, attempt: u32) -> String {
        format!("{capability}_iter{iteration}_attempt{attempt}")
    }
}

/// Where a session persists what it produces.
pub trait ArtifactSink {
    fn save_image(&mut self, session_id: &str, label: &str, image: &RgbaImage) -> ForgeResult<()>;
    fn record_step(&mut self, record: &StepRecord) -> ForgeResult<()>;
    fn write_metadata(&mut self, session_id: &str, metadata: &serde_json::Value) -> ForgeResult<()>;
}

impl<A: ArtifactSink + ?Sized> ArtifactSink for &mut A {
    fn save_image(&mut self, session_id: &str, label: &str, image: &RgbaImage) -> ForgeResult<()> {
        (**self).save_image(session_id, label, image)
    }

    fn record_step(&mut self, record: &StepRecord) -> ForgeResult<()> {
        (**self).record_step(record)
    }

    fn write_metadata(&mut self, session_id: &str, metadata: &serde_json::Value) -> ForgeResult<()> {
        (**self).write_metadata(session_id, metadata)
    }
}

/// Session identifier derived from the local wall clock.
pub fn new_session_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S_%6f").to_string()
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_label(label: &str) -> String {
    let s: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() { "unnamed".to_string() } else { s }
}

/// Writes artifacts under one output directory.
///
/// - `{session}_{label}.png` for images,
/// - `debug/{session}_{step}_{timestamp}.json` for step records,
/// - `{session}_metadata.json` for the session summary.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> ForgeResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("debug"))
            .with_context(|| format!("create artifact dir '{}'", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_path(&self, session_id: &str, label: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.png", sanitize_label(session_id), sanitize_label(label)))
    }

    pub fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.root
            .join(format!("{}_metadata.json", sanitize_label(session_id)))
    }

    fn write_json(path: &Path, value: &impl serde::Serialize) -> ForgeResult<()> {
        let f = fs::File::create(path).with_context(|| format!("create '{}'", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(f), value)
            .map_err(|e| ForgeError::serde(format!("write '{}': {e}", path.display())))
    }
}

impl ArtifactSink for FsArtifactStore {
    fn save_image(&mut self, session_id: &str, label: &str, image: &RgbaImage) -> ForgeResult<()> {
        let path = self.image_path(session_id, label);
        image
            .save(&path)
            .with_context(|| format!("save image '{}'", path.display()))?;
        tracing::debug!(path = %path.display(), "saved artifact image");
        Ok(())
    }

    fn record_step(&mut self, record: &StepRecord) -> ForgeResult<()> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%6f");
        let path = self.root.join("debug").join(format!(
            "{}_{}_{stamp}.json",
            sanitize_label(&record.session_id),
            sanitize_label(&record.step)
        ));
        Self::write_json(&path, record)
    }

    fn write_metadata(&mut self, session_id: &str, metadata: &serde_json::Value) -> ForgeResult<()> {
        let path = self.metadata_path(session_id);
        Self::write_json(&path, metadata)?;
        tracing::info!(path = %path.display(), "wrote session metadata");
        Ok(())
    }
}

/// Keeps every artifact in memory. Used by tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryArtifactStore {
    /// `(session_id, label, image)` in save order.
    pub images: Vec<(String, String, RgbaImage)>,
    pub steps: Vec<StepRecord>,
    pub metadata: Vec<(String, serde_json::Value)>,
    /// When set, `record_step` fails without recording.
    pub fail_step_writes: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_labels(&self) -> Vec<&str> {
        self.images.iter().map(|(_, l, _)| l.as_str()).collect()
    }

    pub fn image(&self, label: &str) -> Option<&RgbaImage> {
        self.images
            .iter()
            .find(|(_, l, _)| l == label)
            .map(|(_, _, img)| img)
    }
}

impl ArtifactSink for MemoryArtifactStore {
    fn save_image(&mut self, session_id: &str, label: &str, image: &RgbaImage) -> ForgeResult<()> {
        self.images
            .push((session_id.to_string(), label.to_string(), image.clone()));
        Ok(())
    }

    fn record_step(&mut self, record: &StepRecord) -> ForgeResult<()> {
        if self.fail_step_writes {
            return Err(ForgeError::Other(anyhow::anyhow!(
                "step log unavailable for '{}'",
                record.step
            )));
        }
        self.steps.push(record.clone());
        Ok(())
    }

    fn write_metadata(&mut self, session_id: &str, metadata: &serde_json::Value) -> ForgeResult<()> {
        self.metadata
            .push((session_id.to_string(), metadata.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/artifacts/store.rs"]
mod tests;
