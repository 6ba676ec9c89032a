// Retrieval module
// Semantic-first verse retrieval with a deterministic keyword fallback

pub mod chapters;
pub mod themes;


pub use chapters::{ChapterAggregator, ScoredChapter, SortBy};

use std::sync::Arc;
use tracing::{debug, warn};

use anyhow::Result;

use crate::corpus::{Corpus, Passage};
use crate::embeddings::LazyEmbedder;
use crate::store::{SearchHit, VectorStore};

/// A passage with its retrieval score attached
#[derive(Debug, Clone)]
pub struct ScoredVerse {
    pub passage: Passage,
    /// Cosine similarity for semantic hits; None for keyword-fallback hits
    pub similarity: Option<f32>,
}

/// How the retriever resolves a theme query.
///
/// The semantic and keyword paths used to be re-chosen ad hoc at every call
/// site; the strategy is now selected once when the retriever is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Embed the query and search the vector index, degrading to substring
    /// matching when that fails or finds nothing
    #[default]
    SemanticFirst,
    /// Substring matching only, never touching the embedding model
    KeywordOnly,
}

/// Retrieves individual passages for a free-text theme.
///
/// Retrieval never fails the caller: any embedding or index error degrades
/// to the keyword path and the caller receives a (possibly empty) list.
pub struct VerseRetriever {
    embedder: Arc<LazyEmbedder>,
    store: Arc<VectorStore>,
    corpus: Arc<Corpus>,
    strategy: SearchStrategy,
    min_similarity: f32,
}

impl VerseRetriever {
    #[inline]
    pub fn new(embedder: Arc<LazyEmbedder>, store: Arc<VectorStore>, corpus: Arc<Corpus>) -> Self {
        Self {
            embedder,
            store,
            corpus,
            strategy: SearchStrategy::default(),
            min_similarity: 0.1,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    #[inline]
    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub(crate) fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Find passages relevant to a theme, best first.
    ///
    /// An empty theme yields an empty list. Keyword-fallback results carry
    /// no similarity score and preserve corpus order.
    #[inline]
    pub fn search_by_theme(&self, theme: &str, max_results: usize) -> Vec<ScoredVerse> {
        self.search_with_limit(theme, max_results, max_results)
    }

    /// Like [`search_by_theme`](Self::search_by_theme) but with a wider
    /// semantic net, for callers that aggregate over many candidates.
    pub(crate) fn search_with_limit(
        &self,
        theme: &str,
        max_results: usize,
        top_k: usize,
    ) -> Vec<ScoredVerse> {
        if theme.trim().is_empty() || max_results == 0 {
            return Vec::new();
        }

        if self.strategy == SearchStrategy::SemanticFirst {
            match self.semantic_candidates(theme, top_k) {
                Ok(hits) if !hits.is_empty() => return hits,
                Ok(_) => {
                    debug!(
                        "Semantic search found nothing for '{}', trying keyword match",
                        theme
                    );
                }
                Err(e) => {
                    warn!("Semantic search failed ({:#}), falling back to keyword match", e);
                }
            }
        }

        self.keyword_matches(theme, max_results)
    }

    /// The semantic path alone. Exposed to the chapter aggregator, which
    /// has its own fallback.
    pub(crate) fn semantic_candidates(
        &self,
        theme: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredVerse>> {
        let embedder = self.embedder.get()?;
        let query_vector = embedder.embed(theme)?;
        let hits = self
            .store
            .search(&query_vector, top_k, self.min_similarity, None);
        Ok(hits.into_iter().map(hit_to_verse).collect())
    }

    /// Deterministic fallback: case-insensitive substring match against the
    /// passage text, its translation, and the chapter name, in corpus order.
    fn keyword_matches(&self, theme: &str, max_results: usize) -> Vec<ScoredVerse> {
        let theme_lower = theme.trim().to_lowercase();
        self.corpus
            .passages()
            .iter()
            .filter(|passage| {
                passage.text.to_lowercase().contains(&theme_lower)
                    || passage
                        .translation
                        .as_ref()
                        .is_some_and(|t| t.to_lowercase().contains(&theme_lower))
                    || passage.chapter_name.to_lowercase().contains(&theme_lower)
            })
            .take(max_results)
            .map(|passage| ScoredVerse {
                passage: passage.clone(),
                similarity: None,
            })
            .collect()
    }
}

/// Embed every corpus passage and add it to the store under its passage id.
///
/// Passages are embedded in batches; `progress` receives
/// `(indexed_so_far, total)` after each batch. Returns the number of
/// passages indexed.
#[inline]
pub fn index_corpus(
    corpus: &Corpus,
    embedder: &dyn crate::embeddings::Embedder,
    store: &VectorStore,
    mut progress: impl FnMut(usize, usize),
) -> crate::Result<usize> {
    const BATCH: usize = 32;

    let passages = corpus.passages();
    let total = passages.len();
    if total == 0 {
        return Ok(0);
    }

    for chunk in passages.chunks(BATCH) {
        let texts: Vec<String> = chunk.iter().map(Passage::embedding_text).collect();
        let vectors = embedder.embed_batch(&texts)?;

        let metadata = chunk
            .iter()
            .map(|passage| crate::store::VerseMetadata {
                id: String::new(),
                chapter_id: passage.chapter_id,
                chapter_name: passage.chapter_name.clone(),
                origin_place: passage.origin_place.clone(),
                text: passage.text.clone(),
                translation: passage.translation.clone(),
                added_at: None,
                updated_at: None,
                extra: std::collections::BTreeMap::new(),
            })
            .collect();
        let ids = chunk.iter().map(|passage| passage.id.clone()).collect();

        let added = store.add(vectors, metadata, Some(ids))?;
        debug!("Indexed batch of {} passages", added.len());
        progress(store.len(), total);
    }

    Ok(total)
}

fn hit_to_verse(hit: SearchHit) -> ScoredVerse {
    let index = hit
        .id
        .split(':')
        .nth(1)
        .and_then(|part| part.parse().ok())
        .unwrap_or(0);
    ScoredVerse {
        passage: Passage {
            id: hit.id,
            chapter_id: hit.metadata.chapter_id,
            index,
            text: hit.metadata.text,
            translation: hit.metadata.translation,
            chapter_name: hit.metadata.chapter_name,
            origin_place: hit.metadata.origin_place,
        },
        similarity: Some(hit.score),
    }
}
