use std::path::Path;

use hotelq_core::config::{EmbedBackend, EmbedConfig};
use hotelq_embed::{get_default_embedder, NgramEmbedder};
use hotelq_core::Embedder;

#[test]
fn ngram_embedder_shapes_and_determinism() {
    let embedder = get_default_embedder(&EmbedConfig::default(), Path::new(".")).expect("embedder");
    assert_eq!(embedder.id(), "ngram:d256");

    let texts = vec!["台北市".to_string(), "台北市".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    assert_eq!(embs.len(), 2);
    let (v1, v2) = (&embs[0], &embs[1]);
    assert_eq!(v1.len(), 256, "embedding dim follows config");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn id_changes_with_dimension() {
    assert_ne!(NgramEmbedder::new(64).id(), NgramEmbedder::new(128).id());
}

#[cfg(not(feature = "model"))]
#[test]
fn model_backend_without_feature_is_an_error() {
    let config = EmbedConfig { backend: EmbedBackend::Model, dim: 256, model_dir: None };
    assert!(get_default_embedder(&config, Path::new("/nonexistent")).is_err());
}
