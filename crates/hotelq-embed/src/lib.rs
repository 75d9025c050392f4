//! Text embedders used by the geo resolver's fuzzy lookup.
//!
//! The default backend is [`NgramEmbedder`], which needs no model files. With
//! the `model` feature a local XLM-RoBERTa checkpoint can be used instead.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotelq_core::config::{resolve_with_base, EmbedBackend, EmbedConfig};
use hotelq_core::Embedder;

mod ngram;
pub use ngram::NgramEmbedder;

#[cfg(feature = "model")]
mod model;
#[cfg(feature = "model")]
mod pool;

#[cfg(feature = "model")]
pub use model::ModelEmbedder;
#[cfg(feature = "model")]
pub use pool::masked_mean_l2;

/// Builds the embedder selected by `embed.backend`. `APP_USE_FAKE_EMBEDDINGS=1`
/// forces the n-gram backend regardless of configuration.
pub fn get_default_embedder(config: &EmbedConfig, base: &Path) -> Result<Arc<dyn Embedder>> {
    let force_ngram = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if force_ngram || config.backend == EmbedBackend::Ngram {
        tracing::debug!(dim = config.dim, "using n-gram embedder");
        return Ok(Arc::new(NgramEmbedder::new(config.dim)));
    }
    let dir = resolve_model_dir(config, base)?;
    load_model(&dir)
}

#[cfg(feature = "model")]
fn load_model(dir: &Path) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(ModelEmbedder::load(dir)?))
}

#[cfg(not(feature = "model"))]
fn load_model(dir: &Path) -> Result<Arc<dyn Embedder>> {
    Err(anyhow!(
        "embed.backend = \"model\" requires the `model` feature (model dir {})",
        dir.display()
    ))
}

fn resolve_model_dir(config: &EmbedConfig, base: &Path) -> Result<PathBuf> {
    if let Some(dir) = &config.model_dir {
        let p = resolve_with_base(base, dir);
        if p.exists() {
            return Ok(p);
        }
        return Err(anyhow!("embed.model_dir does not exist: {}", p.display()));
    }
    if let Ok(dir) = std::env::var("MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
    }
    let local = base.join("models/bge-m3");
    if local.exists() {
        return Ok(local);
    }
    Err(anyhow!("Could not locate an embedding model directory"))
}
