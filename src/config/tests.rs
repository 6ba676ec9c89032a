use super::*;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config {
        embedding: EmbeddingConfig::default(),
        search: SearchConfig::default(),
        scoring: ScoringConfig::default(),
        base_dir: PathBuf::from("/tmp/verse-search-test"),
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.embedding.port, 11434);
    assert_eq!(config.embedding.batch_size, 16);
    assert!((config.search.min_similarity - 0.1).abs() < f32::EPSILON);
    assert_eq!(config.search.overfetch_factor, 8);
    assert_eq!(config.search.max_candidates, 100);
}

#[test]
fn missing_file_yields_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.embedding, EmbeddingConfig::default());
    assert_eq!(config.scoring, ScoringConfig::default());
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.embedding.host = "embeddings.internal".to_string();
    config.embedding.port = 8080;
    config.search.min_similarity = 0.25;
    config.save().expect("should save config");

    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(reloaded.embedding.host, "embeddings.internal");
    assert_eq!(reloaded.embedding.port, 8080);
    assert!((reloaded.search.min_similarity - 0.25).abs() < f32::EPSILON);
}

#[test]
fn rejects_invalid_protocol() {
    let mut config = Config::load("/tmp/nonexistent-config-dir").expect("should load defaults");
    config.embedding.protocol = "ftp".to_string();

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));
}

#[test]
fn rejects_out_of_range_threshold() {
    let mut config = Config::load("/tmp/nonexistent-config-dir").expect("should load defaults");
    config.search.min_similarity = 1.5;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidThreshold(_))
    ));
}

#[test]
fn rejects_unbalanced_weights() {
    let mut config = Config::load("/tmp/nonexistent-config-dir").expect("should load defaults");
    config.scoring.avg_similarity_weight = 0.9;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::UnbalancedWeights(_))
    ));
}

#[test]
fn embedding_url_from_config() {
    let config = Config::load("/tmp/nonexistent-config-dir").expect("should load defaults");

    let url = config.embedding_url().expect("should build URL");
    assert_eq!(url.scheme(), "http");
    assert_eq!(url.host_str(), Some("localhost"));
    assert_eq!(url.port(), Some(11434));
}
