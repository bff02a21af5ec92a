use figment::Jail;

use kbrag_core::config::{AggregateOp, Config, DistanceMetric, RetrievalConfig};
use kbrag_core::types::DocumentField;
use kbrag_core::Error;

#[test]
fn defaults_apply_without_any_file() {
    Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "test");
        let config = Config::load().map_err(|e| e.to_string())?;
        let retrieval = config.retrieval().map_err(|e| e.to_string())?;
        assert_eq!(retrieval, RetrievalConfig::default());
        assert_eq!(retrieval.distance_metric, DistanceMetric::Cosine);
        assert_eq!(config.data().map_err(|e| e.to_string())?.knowledge_dir, "data/knowledge");
        Ok(())
    });
}

#[test]
fn files_and_env_layer_in_order() {
    Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "test");
        jail.create_file(
            "config.toml",
            r#"
            [retrieval]
            chunk_size = 500
            chunk_overlap = 50
            similarity_threshold = 0.4

            [[retrieval.intents]]
            name = "count_by_category"
            phrases = ["tally by category"]
            operation = { op = "count_by", field = "category" }
            "#,
        )?;
        jail.create_file("config.test.toml", "[retrieval]\nchunk_overlap = 60\n")?;
        jail.set_env("SIMILARITY_THRESHOLD", "0.5");
        jail.set_env("APP_RETRIEVAL__MAX_RETRIEVAL_RESULTS", "7");

        let retrieval = Config::load().map_err(|e| e.to_string())?.retrieval().map_err(|e| e.to_string())?;
        assert_eq!(retrieval.chunk_size, 500);
        assert_eq!(retrieval.chunk_overlap, 60);
        assert!((retrieval.similarity_threshold - 0.5).abs() < 1e-6);
        assert_eq!(retrieval.max_retrieval_results, 7);
        assert_eq!(retrieval.intents.len(), 1);
        assert_eq!(retrieval.intents[0].operation, AggregateOp::CountBy { field: DocumentField::Category });
        Ok(())
    });
}

#[test]
fn inconsistent_chunking_is_rejected_at_load() {
    Jail::expect_with(|jail| {
        jail.set_env("RUST_ENV", "test");
        jail.set_env("CHUNK_SIZE", "100");
        jail.set_env("CHUNK_OVERLAP", "100");
        assert!(Config::load().is_err());
        Ok(())
    });
}

#[test]
fn validate_rejects_out_of_range_threshold() {
    let config = RetrievalConfig { similarity_threshold: 1.5, ..RetrievalConfig::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    let config = RetrievalConfig { max_conversation_history: 0, ..RetrievalConfig::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn session_timeout_is_in_seconds() {
    let config = RetrievalConfig { session_timeout: 90, ..RetrievalConfig::default() };
    assert_eq!(config.session_timeout().as_secs(), 90);
}
