// Configuration management module
// Handles TOML configuration for the embedding server, storage, and scoring

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the Ollama-compatible embedding server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Primary model. Must embed both the original script and the
    /// translation language into one vector space.
    pub model: String,
    /// Tried once when the primary model is not available on the server.
    pub fallback_model: String,
    pub batch_size: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "bge-m3:latest".to_string(),
            fallback_model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
        }
    }
}

/// Retrieval tuning knobs shared by verse search and chapter aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Similarity floor applied to semantic verse hits
    pub min_similarity: f32,
    /// Chapter search requests `max_results * overfetch_factor` passages
    pub overfetch_factor: usize,
    /// Hard cap on over-fetched passage candidates
    pub max_candidates: usize,
    /// Passages kept per chapter for presentation
    pub top_passages_per_chapter: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.1,
            overfetch_factor: 8,
            max_candidates: 100,
            top_passages_per_chapter: 3,
        }
    }
}

/// Weights for the chapter composite score and lexical corrections.
///
/// The defaults were tuned empirically against manual relevance checks and
/// have no analytical derivation, so they are kept configurable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub avg_similarity_weight: f32,
    pub max_similarity_weight: f32,
    pub verse_density_weight: f32,
    pub contextual_weight: f32,
    pub theme_diversity_weight: f32,
    /// Added to a passage's similarity for each query keyword it contains
    pub keyword_boost: f32,
    /// Contextual score when the full theme string appears in the passage
    pub direct_match_score: f32,
    /// Scales keyword density into the contextual score
    pub keyword_density_scale: f32,
    /// Contextual bonus per concept indicated by the theme and present in
    /// the passage
    pub indicator_bonus: f32,
    pub indicator_bonus_cap: f32,
    /// Score assigned to chapters matched by the keyword-only fallback
    pub fallback_chapter_score: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            avg_similarity_weight: 0.4,
            max_similarity_weight: 0.3,
            verse_density_weight: 0.15,
            contextual_weight: 0.10,
            theme_diversity_weight: 0.05,
            keyword_boost: 0.1,
            direct_match_score: 0.8,
            keyword_density_scale: 0.6,
            indicator_bonus: 0.1,
            indicator_bonus_cap: 0.2,
            fallback_chapter_score: 0.5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid similarity threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidThreshold(f32),
    #[error("Invalid overfetch factor: {0} (must be at least 1)")]
    InvalidOverfetch(usize),
    #[error("Invalid scoring constant {0}: {1} (must be between 0.0 and 1.0)")]
    InvalidScoringConstant(&'static str, f32),
    #[error("Composite score weights sum to {0}, expected 1.0")]
    UnbalancedWeights(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedding: EmbeddingConfig::default(),
                search: SearchConfig::default(),
                scoring: ScoringConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.port == 0 {
            return Err(ConfigError::InvalidPort(self.embedding.port));
        }
        if self.embedding.batch_size == 0 || self.embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding.batch_size));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding.model.clone()));
        }
        if self.embedding.fallback_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(
                self.embedding.fallback_model.clone(),
            ));
        }
        if self.embedding.protocol != "http" && self.embedding.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.embedding.protocol.clone()));
        }
        if !(0.0..=1.0).contains(&self.search.min_similarity) {
            return Err(ConfigError::InvalidThreshold(self.search.min_similarity));
        }
        if self.search.overfetch_factor == 0 {
            return Err(ConfigError::InvalidOverfetch(self.search.overfetch_factor));
        }

        let s = &self.scoring;
        for (name, value) in [
            ("avg_similarity_weight", s.avg_similarity_weight),
            ("max_similarity_weight", s.max_similarity_weight),
            ("verse_density_weight", s.verse_density_weight),
            ("contextual_weight", s.contextual_weight),
            ("theme_diversity_weight", s.theme_diversity_weight),
            ("keyword_boost", s.keyword_boost),
            ("direct_match_score", s.direct_match_score),
            ("keyword_density_scale", s.keyword_density_scale),
            ("indicator_bonus", s.indicator_bonus),
            ("indicator_bonus_cap", s.indicator_bonus_cap),
            ("fallback_chapter_score", s.fallback_chapter_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidScoringConstant(name, value));
            }
        }

        let weight_sum = s.avg_similarity_weight
            + s.max_similarity_weight
            + s.verse_density_weight
            + s.contextual_weight
            + s.theme_diversity_weight;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::UnbalancedWeights(weight_sum));
        }

        Ok(())
    }

    /// Base URL of the embedding server
    #[inline]
    pub fn embedding_url(&self) -> Result<Url, ConfigError> {
        let url_string = format!(
            "{}://{}:{}",
            self.embedding.protocol, self.embedding.host, self.embedding.port
        );
        Url::parse(&url_string).map_err(|_| ConfigError::InvalidUrl(url_string))
    }

    /// Root directory for named vector stores
    #[inline]
    pub fn storage_root(&self) -> PathBuf {
        self.base_dir.join("stores")
    }

    /// Normalized corpus snapshot written at ingest time
    #[inline]
    pub fn corpus_file(&self) -> PathBuf {
        self.base_dir.join("corpus.json")
    }

    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::DirectoryError)?;
        Ok(base.join("verse-search"))
    }
}

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    Config::config_dir()
}
