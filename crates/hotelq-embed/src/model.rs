use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use hotelq_core::{EmbedError, Embedder};
use tokenizers::Tokenizer;

use crate::pool::masked_mean_l2;

/// Place names are short; longer inputs are truncated.
const MAX_TOKENS: usize = 32;
/// Names embedded per forward pass during a cache build.
const BATCH: usize = 64;
/// XLM-R `<pad>`.
const PAD_ID: u32 = 1;

/// Metal when built with the `metal` feature and a GPU is present, unless
/// `APP_EMBED_CPU=1`.
fn model_device() -> Device {
    let force_cpu = std::env::var("APP_EMBED_CPU").is_ok_and(|v| v == "1");
    #[cfg(feature = "metal")]
    if !force_cpu {
        match Device::new_metal(0) {
            Ok(dev) => return dev,
            Err(e) => tracing::warn!(error = %e, "metal unavailable, falling back to cpu"),
        }
    }
    tracing::debug!(force_cpu, "embedding on cpu");
    Device::Cpu
}

/// XLM-RoBERTa sentence embedder (BGE-M3 weights) loaded from a local
/// directory holding `tokenizer.json`, `config.json` and `pytorch_model.bin`.
pub struct ModelEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    id: String,
}

impl ModelEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = model_device();
        tracing::info!(dir = %model_dir.display(), device = ?device, "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "xlm-roberta".to_string());
        let dim = config.hidden_size;
        tracing::info!(model = %name, dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, id: format!("{name}:d{dim}") })
    }

    /// Encodes `texts` as `[B, T]` id and mask tensors, `T` being the
    /// longest encoding in the batch.
    fn encode(&self, texts: &[String]) -> Result<(Tensor, Tensor)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let width = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_TOKENS))
            .max()
            .unwrap_or(0)
            .max(1);
        let mut ids = Vec::with_capacity(texts.len() * width);
        let mut mask = Vec::with_capacity(texts.len() * width);
        for enc in &encodings {
            let n = enc.get_ids().len().min(width);
            ids.extend_from_slice(&enc.get_ids()[..n]);
            mask.extend_from_slice(&enc.get_attention_mask()[..n]);
            ids.resize(ids.len() + width - n, PAD_ID);
            mask.resize(mask.len() + width - n, 0);
        }
        let shape = (texts.len(), width);
        let ids = Tensor::from_vec(ids, shape, &self.device)?;
        let mask = Tensor::from_vec(mask, shape, &self.device)?;
        Ok((ids, mask))
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = self.encode(texts)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden =
            self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(anyhow!("model produced {} dims, expected {}", v.len(), self.dim));
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(texts = texts.len(), elapsed_ms, "embedded batch");
        Ok(vectors)
    }
}

impl Embedder for ModelEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH) {
            out.extend(self.embed_chunk(chunk).map_err(|e| EmbedError::Model(e.to_string()))?);
        }
        Ok(out)
    }
}
