use kbrag_core::config::RetrievalConfig;
use kbrag_core::traits::Embedder;
use kbrag_embed::{get_default_embedder, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(256);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 256, "embedding dim is 256");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_vocabulary_scores_higher() {
    let embedder = HashEmbedder::new(512);
    let q = embedder.embed("How do I start a fire?").unwrap();
    let near = embedder.embed("To start a fire use dry tinder").unwrap();
    let far = embedder.embed("Solar panels charge batteries").unwrap();
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn empty_text_is_the_zero_vector() {
    let embedder = HashEmbedder::new(8);
    let v = embedder.embed("").unwrap();
    assert!(v.iter().all(|x| *x == 0.0));
}

#[test]
fn config_selects_hash_model() {
    let config = RetrievalConfig { embedding_model: "hash".into(), embedding_dim: 64, ..RetrievalConfig::default() };
    let embedder = get_default_embedder(&config).expect("embedder");
    assert_eq!(embedder.dim(), 64);
    assert_eq!(embedder.model_id(), "hash:d64");
}

#[test]
fn unknown_model_is_an_error() {
    let config = RetrievalConfig { embedding_model: "word2vec".into(), ..RetrievalConfig::default() };
    if std::env::var("APP_USE_FAKE_EMBEDDINGS").is_err() {
        assert!(get_default_embedder(&config).is_err());
    }
}
