use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::corpus::{Corpus, SummaryCache};
use crate::embeddings::{Embedder, EmbeddingClient, LazyEmbedder};
use crate::retrieval::{
    ChapterAggregator, ScoredVerse, SearchStrategy, SortBy, VerseRetriever, index_corpus,
};
use crate::store::{StoreManager, VectorStore};
use crate::wellness::{WellnessGuide, detect_categories};

/// Store name used when the caller does not pick one
pub const DEFAULT_STORE: &str = "verses";

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(config_dir)
}

fn open_store(config: &Config, store_name: &str) -> Result<Arc<VectorStore>> {
    let manager = StoreManager::new(config.storage_root());
    Ok(manager.store(store_name)?)
}

fn load_ingested_corpus(config: &Config) -> Result<Arc<Corpus>> {
    let corpus_file = config.corpus_file();
    if !corpus_file.exists() {
        bail!(
            "No ingested corpus found at {}. Run 'verse-search ingest <data-file>' first.",
            corpus_file.display()
        );
    }
    Ok(Arc::new(Corpus::load(&corpus_file)?))
}

fn build_retriever(
    config: &Config,
    store_name: &str,
    strategy: SearchStrategy,
    min_similarity: Option<f32>,
) -> Result<Arc<VerseRetriever>> {
    let store = open_store(config, store_name)?;
    let corpus = load_ingested_corpus(config)?;

    let factory_config = config.clone();
    let embedder = LazyEmbedder::new(Box::new(move || {
        let client = EmbeddingClient::connect(&factory_config)?;
        Ok(Arc::new(client) as Arc<dyn Embedder>)
    }));

    let mut retriever = VerseRetriever::new(Arc::new(embedder), store, corpus)
        .with_strategy(strategy)
        .with_min_similarity(config.search.min_similarity);
    if let Some(min_similarity) = min_similarity {
        retriever = retriever.with_min_similarity(min_similarity);
    }
    Ok(Arc::new(retriever))
}

/// Show the current configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("{}", style("Embedding Server:").bold().yellow());
    eprintln!("  Host: {}", style(&config.embedding.host).cyan());
    eprintln!("  Port: {}", style(config.embedding.port).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!(
        "  Fallback Model: {}",
        style(&config.embedding.fallback_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    eprintln!();
    eprintln!("{}", style("Search:").bold().yellow());
    eprintln!(
        "  Min Similarity: {}",
        style(config.search.min_similarity).cyan()
    );
    eprintln!(
        "  Overfetch Factor: {}",
        style(config.search.overfetch_factor).cyan()
    );
    eprintln!();
    eprintln!(
        "Storage root: {}",
        style(config.storage_root().display()).dim()
    );
    eprintln!(
        "Config file: {}",
        style(config.base_dir.join("config.toml").display()).dim()
    );

    Ok(())
}

/// Embed a corpus data file and build the vector index
#[inline]
pub fn ingest(data_file: &Path, store_name: &str, force: bool) -> Result<()> {
    let config = load_config()?;
    let corpus = Corpus::load(data_file)
        .with_context(|| format!("Failed to load corpus from {}", data_file.display()))?;

    let store = open_store(&config, store_name)?;

    if !force && store.len() == corpus.passage_count() && !store.is_empty() {
        println!(
            "Store '{}' already holds {} passages, skipping ingest (use --force to re-embed).",
            store_name,
            store.len()
        );
        return Ok(());
    }
    if !store.is_empty() {
        info!("Clearing {} existing vectors before re-ingest", store.len());
        store.clear();
    }

    println!(
        "Ingesting {} passages across {} chapters...",
        corpus.passage_count(),
        corpus.chapter_count()
    );

    let client = EmbeddingClient::connect(&config)
        .context("Failed to initialize embedding client")?;
    println!("Embedding with model: {}", client.model());

    let progress = ProgressBar::new(corpus.passage_count() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} passages ({eta})")
            .context("Invalid progress bar template")?,
    );

    index_corpus(&corpus, &client, &store, |done, _total| {
        progress.set_position(done as u64);
    })?;
    progress.finish_and_clear();

    store.save().context("Failed to persist vector store")?;
    corpus
        .save(config.corpus_file())
        .context("Failed to write corpus snapshot")?;

    println!(
        "✓ Indexed {} passages into store '{}' ({})",
        store.len(),
        store_name,
        config.storage_root().join(store_name).display()
    );
    Ok(())
}

/// Search individual passages by theme
#[inline]
pub fn search(
    theme: &str,
    limit: usize,
    min_similarity: Option<f32>,
    keyword_only: bool,
) -> Result<()> {
    let config = load_config()?;
    let strategy = if keyword_only {
        SearchStrategy::KeywordOnly
    } else {
        SearchStrategy::SemanticFirst
    };
    let retriever = build_retriever(&config, DEFAULT_STORE, strategy, min_similarity)?;

    let results = retriever.search_by_theme(theme, limit);
    if results.is_empty() {
        println!("No passages found for \"{}\".", theme);
        return Ok(());
    }

    println!("Passages for \"{}\" ({} found):", theme, results.len());
    println!();
    for verse in &results {
        print_verse(verse, "");
        println!();
    }
    Ok(())
}

/// Search chapters by theme with composite scoring
#[inline]
pub fn chapters(theme: &str, limit: usize, sort: &str) -> Result<()> {
    let config = load_config()?;
    let sort_by: SortBy = sort
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let retriever = build_retriever(&config, DEFAULT_STORE, SearchStrategy::SemanticFirst, None)?;
    let aggregator = ChapterAggregator::new(
        retriever,
        SummaryCache::with_static(),
        config.search.clone(),
        config.scoring.clone(),
    );

    let results = aggregator.search_chapters_by_theme(theme, limit, sort_by);
    if results.is_empty() {
        println!("No chapters found for \"{}\".", theme);
        return Ok(());
    }

    println!("Chapters for \"{}\" ({} found):", theme, results.len());
    println!();
    for chapter in &results {
        println!(
            "📖 {} (chapter {}, score {:.3})",
            style(&chapter.name).bold(),
            chapter.chapter_id,
            chapter.score
        );
        println!("   {}", chapter.explanation);
        if !chapter.themes_found.is_empty() {
            println!("   Themes: {}", chapter.themes_found.join(", "));
        }
        for verse in &chapter.matching_passages {
            print_verse(verse, "   ");
        }
        println!();
    }
    Ok(())
}

/// Detect wellness categories in free text and show supporting passages
#[inline]
pub fn wellness(text: &str, limit: usize) -> Result<()> {
    let matches = detect_categories(text);
    if matches.is_empty() {
        println!("No wellness categories detected.");
        return Ok(());
    }

    let config = load_config()?;
    let retriever = build_retriever(&config, DEFAULT_STORE, SearchStrategy::SemanticFirst, None)?;
    let guide = WellnessGuide::new(retriever);

    for category_match in &matches {
        let category = category_match.category;
        println!(
            "🌱 {} (score {})",
            style(category.name).bold(),
            category_match.relevance_score
        );
        println!("   {}", category.description);

        let passages = guide.category_passages(category.id, limit);
        if passages.is_empty() {
            println!("   No supporting passages indexed.");
        }
        for verse in &passages {
            print_verse(verse, "   ");
        }
        println!();
    }
    Ok(())
}

/// Show store and corpus status
#[inline]
pub fn status() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config, DEFAULT_STORE)?;
    let stats = store.stats();

    println!("Store '{}':", DEFAULT_STORE);
    println!("  Vectors: {}", stats.num_vectors);
    match stats.dimension {
        Some(dimension) => println!("  Dimension: {}", dimension),
        None => println!("  Dimension: (empty store)"),
    }
    println!("  Location: {}", stats.storage_dir.display());
    println!(
        "  Artifacts: vectors={} metadata={} index={}",
        stats.vectors_file_exists, stats.metadata_file_exists, stats.index_file_exists
    );
    println!();

    let corpus_file = config.corpus_file();
    if corpus_file.exists() {
        let corpus = Corpus::load(&corpus_file)?;
        println!(
            "Corpus: {} chapters, {} passages ({})",
            corpus.chapter_count(),
            corpus.passage_count(),
            corpus_file.display()
        );
    } else {
        println!("Corpus: not ingested yet");
    }
    Ok(())
}

/// Clear a store's vectors in memory and on disk
#[inline]
pub fn clear(store_name: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config, store_name)?;

    let removed = store.len();
    store.clear();
    store.save().context("Failed to persist cleared store")?;

    println!("✓ Cleared {} vectors from store '{}'", removed, store_name);
    Ok(())
}

fn print_verse(verse: &ScoredVerse, indent: &str) {
    let score_label = match verse.similarity {
        Some(score) => format!("{:.3}", score),
        None => "keyword".to_string(),
    };
    println!(
        "{}[{}] {} ({}, {})",
        indent, score_label, verse.passage.id, verse.passage.chapter_name, verse.passage.origin_place
    );
    println!("{}  {}", indent, verse.passage.text);
    if let Some(translation) = &verse.passage.translation {
        println!("{}  {}", indent, translation);
    }
}
