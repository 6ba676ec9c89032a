//! Chapter-level aggregation of verse hits.
//!
//! Verse candidates are over-fetched, grouped by chapter, and rolled up
//! into one composite relevance score per chapter, with a short generated
//! explanation of why the chapter ranked where it did.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::themes;
use super::{ScoredVerse, SearchStrategy, VerseRetriever};
use crate::config::{ScoringConfig, SearchConfig};
use crate::corpus::{Chapter, Corpus, SummaryCache};

/// Each detected theme nudges the diversity term by this much, up to the cap
const DIVERSITY_STEP: f32 = 0.05;
const DIVERSITY_CAP: f32 = 0.05;

/// Final ordering of chapter results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Composite relevance score, best first
    #[default]
    Relevance,
    /// Numeric chapter id, ascending
    ChapterId,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "id" | "chapter" | "chapter_id" => Ok(Self::ChapterId),
            other => Err(format!("Unknown sort order: {}", other)),
        }
    }
}

/// A chapter ranked against a theme query. Built fresh per query.
#[derive(Debug, Clone)]
pub struct ScoredChapter {
    pub chapter_id: u32,
    pub name: String,
    pub origin_place: String,
    pub passage_count: u32,
    /// Composite relevance in [0, 1]
    pub score: f32,
    /// Best-matching passages, adjusted similarity descending
    pub matching_passages: Vec<ScoredVerse>,
    pub themes_found: Vec<String>,
    pub explanation: String,
    pub coverage_text: String,
}

struct ChapterGroup {
    passages: Vec<ScoredVerse>,
    total_similarity: f32,
    max_similarity: f32,
    contextual_total: f32,
    themes_found: BTreeSet<String>,
}

impl ChapterGroup {
    fn new() -> Self {
        Self {
            passages: Vec::new(),
            total_similarity: 0.0,
            max_similarity: 0.0,
            contextual_total: 0.0,
            themes_found: BTreeSet::new(),
        }
    }
}

/// Rolls verse-level hits up into ranked chapters
pub struct ChapterAggregator {
    retriever: Arc<VerseRetriever>,
    corpus: Arc<Corpus>,
    summaries: SummaryCache,
    search: SearchConfig,
    scoring: ScoringConfig,
}

impl ChapterAggregator {
    #[inline]
    pub fn new(
        retriever: Arc<VerseRetriever>,
        summaries: SummaryCache,
        search: SearchConfig,
        scoring: ScoringConfig,
    ) -> Self {
        let corpus = Arc::clone(retriever.corpus());
        Self {
            retriever,
            corpus,
            summaries,
            search,
            scoring,
        }
    }

    /// Find chapters relevant to a theme.
    ///
    /// Over-fetches verse candidates (many passages collapse into few
    /// chapters), scores each chapter from its grouped hits, and truncates
    /// to `max_results` by relevance before applying the requested ordering.
    /// When the semantic path is unavailable, chapters are matched by the
    /// theme appearing in their name, summary, or origin place instead.
    #[inline]
    pub fn search_chapters_by_theme(
        &self,
        theme: &str,
        max_results: usize,
        sort_by: SortBy,
    ) -> Vec<ScoredChapter> {
        if theme.trim().is_empty() || max_results == 0 {
            return Vec::new();
        }

        let top_k = (max_results * self.search.overfetch_factor).min(self.search.max_candidates);

        let semantic_hits = if self.retriever.strategy() == SearchStrategy::KeywordOnly {
            None
        } else {
            match self.retriever.semantic_candidates(theme, top_k) {
                Ok(hits) if !hits.is_empty() => Some(hits),
                Ok(_) => {
                    debug!("No semantic verse hits for '{}', matching chapter attributes", theme);
                    None
                }
                Err(e) => {
                    warn!(
                        "Chapter search degrading to keyword matching: {:#}",
                        e
                    );
                    None
                }
            }
        };

        let mut chapters = match semantic_hits {
            Some(hits) => self.aggregate(theme, hits),
            None => self.keyword_fallback(theme),
        };

        chapters.sort_by(|a, b| b.score.total_cmp(&a.score));
        chapters.truncate(max_results);

        if sort_by == SortBy::ChapterId {
            chapters.sort_by_key(|chapter| chapter.chapter_id);
        }

        chapters
    }

    fn aggregate(&self, theme: &str, hits: Vec<ScoredVerse>) -> Vec<ScoredChapter> {
        let theme_lower = theme.trim().to_lowercase();
        let keywords = themes::theme_keywords(theme);

        let mut groups: HashMap<u32, ChapterGroup> = HashMap::new();
        for hit in hits {
            let passage_lower = searchable_text(&hit);
            let base = hit.similarity.unwrap_or(0.0);
            let adjusted = themes::boosted_similarity(
                base,
                &keywords,
                &passage_lower,
                self.scoring.keyword_boost,
            );
            let contextual =
                themes::contextual_relevance(&theme_lower, &keywords, &passage_lower, &self.scoring);
            let detected = themes::extract_themes(&theme_lower, &passage_lower);

            let group = groups
                .entry(hit.passage.chapter_id)
                .or_insert_with(ChapterGroup::new);
            group.total_similarity += adjusted;
            group.max_similarity = group.max_similarity.max(adjusted);
            group.contextual_total += contextual;
            group.themes_found.extend(detected);
            group.passages.push(ScoredVerse {
                passage: hit.passage,
                similarity: Some(adjusted),
            });
        }

        groups
            .into_iter()
            .filter_map(|(chapter_id, mut group)| {
                let Some(chapter) = self.corpus.chapter(chapter_id) else {
                    debug!("Dropping hits for unknown chapter {}", chapter_id);
                    return None;
                };

                let verse_count = group.passages.len();
                let score = self.composite_score(chapter, &group);

                group
                    .passages
                    .sort_by(|a, b| {
                        b.similarity
                            .unwrap_or(0.0)
                            .total_cmp(&a.similarity.unwrap_or(0.0))
                    });
                group.passages.truncate(self.search.top_passages_per_chapter);

                let verse_density = density(verse_count, chapter.passage_count);
                let coverage_text = coverage_phrase(verse_density).to_string();
                let themes_found: Vec<String> = group.themes_found.into_iter().collect();
                let explanation =
                    explain(chapter, theme, score, verse_count, &themes_found, &coverage_text);

                Some(ScoredChapter {
                    chapter_id,
                    name: chapter.name.clone(),
                    origin_place: chapter.origin_place.clone(),
                    passage_count: chapter.passage_count,
                    score,
                    matching_passages: group.passages,
                    themes_found,
                    explanation,
                    coverage_text,
                })
            })
            .collect()
    }

    /// Weighted blend of similarity, coverage, contextual, and diversity
    /// signals, each in [0, 1].
    fn composite_score(&self, chapter: &Chapter, group: &ChapterGroup) -> f32 {
        let verse_count = group.passages.len() as f32;
        let avg_similarity = group.total_similarity / verse_count;
        let verse_density = density(group.passages.len(), chapter.passage_count);
        let avg_contextual = group.contextual_total / verse_count;
        let theme_diversity = group.themes_found.len() as f32;

        let s = &self.scoring;
        let score = s.avg_similarity_weight * avg_similarity
            + s.max_similarity_weight * group.max_similarity
            + s.verse_density_weight * verse_density
            + s.contextual_weight * avg_contextual
            + s.theme_diversity_weight * (theme_diversity * DIVERSITY_STEP).min(DIVERSITY_CAP);
        score.min(1.0)
    }

    /// Chapter-attribute matching used when no semantic hits are available
    fn keyword_fallback(&self, theme: &str) -> Vec<ScoredChapter> {
        let theme_lower = theme.trim().to_lowercase();
        self.corpus
            .chapters()
            .filter_map(|chapter| {
                let mut matched_fields = Vec::new();
                if chapter.name.to_lowercase().contains(&theme_lower) {
                    matched_fields.push("name");
                }
                if self
                    .summaries
                    .summary(chapter)
                    .to_lowercase()
                    .contains(&theme_lower)
                {
                    matched_fields.push("summary");
                }
                if chapter.origin_place.to_lowercase().contains(&theme_lower) {
                    matched_fields.push("origin place");
                }
                if matched_fields.is_empty() {
                    return None;
                }

                Some(ScoredChapter {
                    chapter_id: chapter.chapter_id,
                    name: chapter.name.clone(),
                    origin_place: chapter.origin_place.clone(),
                    passage_count: chapter.passage_count,
                    score: self.scoring.fallback_chapter_score,
                    matching_passages: Vec::new(),
                    themes_found: Vec::new(),
                    explanation: format!(
                        "{} mentions \"{}\" in its {}",
                        chapter.name,
                        theme,
                        matched_fields.join(" and ")
                    ),
                    coverage_text: String::new(),
                })
            })
            .collect()
    }
}

/// Text a passage is lexically matched against: original text plus
/// translation, lowercased. Keyword queries are usually in the translation
/// language, so matching the original script alone would miss them.
fn searchable_text(verse: &ScoredVerse) -> String {
    let mut text = verse.passage.text.to_lowercase();
    if let Some(translation) = &verse.passage.translation {
        text.push(' ');
        text.push_str(&translation.to_lowercase());
    }
    text
}

fn density(verse_count: usize, passage_count: u32) -> f32 {
    if passage_count == 0 {
        return 0.0;
    }
    (verse_count as f32 / passage_count as f32).min(1.0)
}

fn coverage_phrase(verse_density: f32) -> &'static str {
    if verse_density > 0.1 {
        "substantial coverage of the chapter"
    } else if verse_density > 0.05 {
        "moderate coverage of the chapter"
    } else {
        "a focused selection of passages"
    }
}

fn explain(
    chapter: &Chapter,
    theme: &str,
    score: f32,
    verse_count: usize,
    themes_found: &[String],
    coverage_text: &str,
) -> String {
    let relation = if score > 0.8 {
        "is highly relevant to"
    } else if score > 0.6 {
        "has strong connections to"
    } else {
        "relates to"
    };

    let mut explanation = format!(
        "{} {} \"{}\" through {} matching passage{}",
        chapter.name,
        relation,
        theme,
        verse_count,
        if verse_count == 1 { "" } else { "s" }
    );

    match themes_found {
        [] => {}
        [only] => explanation.push_str(&format!(", touching on {}", only)),
        [first, second, ..] => {
            explanation.push_str(&format!(", touching on {} and {}", first, second));
        }
    }

    explanation.push_str(&format!(", with {}.", coverage_text));
    explanation
}
