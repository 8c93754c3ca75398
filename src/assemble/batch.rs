use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use crate::{
    composite::chroma::process_character,
    foundation::{
        config::CompositorConfig,
        error::{ForgeError, ForgeResult},
    },
    panel::model::CharacterReference,
};

/// A raw character render waiting for the compositor.
#[derive(Clone, Debug)]
pub struct CharacterRender {
    pub name: String,
    pub height_cm: u32,
    pub raw: Arc<RgbaImage>,
}

impl CharacterRender {
    pub fn new(name: impl Into<String>, height_cm: u32, raw: RgbaImage) -> Self {
        Self {
            name: name.into(),
            height_cm,
            raw: Arc::new(raw),
        }
    }
}

/// Run the compositor for every render on a short-lived worker pool.
///
/// Renders are independent, so they are processed in parallel; results come back in input order,
/// one per render, so a single unusable render can be regenerated without redoing the rest.
pub fn process_characters(
    renders: &[CharacterRender],
    cfg: &CompositorConfig,
    threads: Option<usize>,
) -> ForgeResult<Vec<ForgeResult<CharacterReference>>> {
    cfg.validate()?;
    if renders.is_empty() {
        return Ok(Vec::new());
    }

    let pool = build_thread_pool(threads)?;
    let results = pool.install(|| {
        renders
            .par_iter()
            .map(|r| process_character(&r.name, r.height_cm, &r.raw, cfg))
            .collect::<Vec<_>>()
    });

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        tracing::warn!(failed, total = renders.len(), "some character renders were unusable");
    }
    Ok(results)
}

/// Like [`process_characters`], but fail on the first unusable render (in input order).
pub fn process_all_characters(
    renders: &[CharacterRender],
    cfg: &CompositorConfig,
    threads: Option<usize>,
) -> ForgeResult<Vec<CharacterReference>> {
    process_characters(renders, cfg, threads)?
        .into_iter()
        .collect()
}

fn build_thread_pool(threads: Option<usize>) -> ForgeResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(ForgeError::validation(
            "compositor 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ForgeError::validation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/batch.rs"]
mod tests;
