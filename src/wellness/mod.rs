// Wellness module
// Static taxonomy matching free text to guidance categories


use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

use crate::retrieval::{ScoredVerse, VerseRetriever};

const KEYWORD_WEIGHT: u32 = 2;
const THEME_WORD_WEIGHT: u32 = 1;
/// Categories returned per detection call
const MAX_DETECTED: usize = 3;
/// Theme phrases searched per category when pulling supporting passages
const PHRASES_PER_CATEGORY: usize = 3;

/// A fixed guidance category with its detection vocabulary
#[derive(Debug)]
pub struct WellnessCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Retrieval queries used to pull supporting passages
    pub theme_phrases: &'static [&'static str],
    /// Literal words that signal this category in user text
    pub keywords: &'static [&'static str],
}

pub const CATEGORIES: &[WellnessCategory] = &[
    WellnessCategory {
        id: "anxiety_stress",
        name: "Anxiety & Stress",
        description: "Finding calm and reassurance in times of worry.",
        theme_phrases: &[
            "peace of mind",
            "trust in God",
            "relief from worry",
            "calm hearts",
        ],
        keywords: &[
            "anxious", "anxiety", "stress", "stressed", "worried", "worry", "overwhelmed",
            "panic", "nervous", "afraid",
        ],
    },
    WellnessCategory {
        id: "gratitude",
        name: "Gratitude",
        description: "Recognizing and giving thanks for blessings.",
        theme_phrases: &["giving thanks", "counting blessings", "appreciation for life"],
        keywords: &["grateful", "gratitude", "thankful", "blessed", "blessing", "appreciate"],
    },
    WellnessCategory {
        id: "patience_perseverance",
        name: "Patience & Perseverance",
        description: "Enduring trials with steadfastness.",
        theme_phrases: &[
            "patience in hardship",
            "steadfast endurance",
            "perseverance through trials",
        ],
        keywords: &[
            "patience", "patient", "persevere", "endure", "struggling", "hardship", "difficult",
        ],
    },
    WellnessCategory {
        id: "forgiveness_healing",
        name: "Forgiveness & Healing",
        description: "Letting go of guilt and seeking pardon.",
        theme_phrases: &["seeking forgiveness", "mercy and pardon", "healing old wounds"],
        keywords: &["forgive", "forgiveness", "guilt", "guilty", "regret", "remorse", "mistake"],
    },
    WellnessCategory {
        id: "hope_despair",
        name: "Hope & Despair",
        description: "Holding on to hope when things look dark.",
        theme_phrases: &["hope after hardship", "light after darkness", "never despair"],
        keywords: &["hopeless", "despair", "hope", "discouraged", "depressed", "giving up"],
    },
    WellnessCategory {
        id: "grief_loss",
        name: "Grief & Loss",
        description: "Comfort for mourning and bereavement.",
        theme_phrases: &["comfort in loss", "patience with grief", "solace for the mourning"],
        keywords: &["grief", "grieving", "loss", "died", "death", "mourning", "bereaved"],
    },
    WellnessCategory {
        id: "anger_management",
        name: "Anger",
        description: "Restraining anger and responding gently.",
        theme_phrases: &["restraining anger", "gentle responses", "controlling temper"],
        keywords: &["angry", "anger", "furious", "rage", "temper", "irritated", "frustrated"],
    },
    WellnessCategory {
        id: "purpose_meaning",
        name: "Purpose & Meaning",
        description: "Searching for direction and significance.",
        theme_phrases: &["purpose of life", "meaning in creation", "serving others"],
        keywords: &["purpose", "meaning", "direction", "lost", "empty", "pointless"],
    },
];

/// A detected category with its overlap score
#[derive(Debug, Clone)]
pub struct CategoryMatch {
    pub category: &'static WellnessCategory,
    pub relevance_score: u32,
}

/// Look up a category by its stable id
#[inline]
pub fn category(id: &str) -> Option<&'static WellnessCategory> {
    CATEGORIES.iter().find(|c| c.id == id)
}

/// Score free text against the taxonomy.
///
/// Keywords found in the lowercased text count double; words longer than
/// three characters from the theme phrases count single. Categories with no
/// overlap are dropped and the top three remain, ties in taxonomy order.
#[inline]
pub fn detect_categories(text: &str) -> Vec<CategoryMatch> {
    let lower = text.to_lowercase();

    let mut matches: Vec<CategoryMatch> = CATEGORIES
        .iter()
        .filter_map(|category| {
            let mut score = 0;
            for keyword in category.keywords {
                if lower.contains(keyword) {
                    score += KEYWORD_WEIGHT;
                }
            }
            for phrase in category.theme_phrases {
                for word in phrase.to_lowercase().split_whitespace() {
                    if word.chars().count() > 3 && lower.contains(word) {
                        score += THEME_WORD_WEIGHT;
                    }
                }
            }
            (score > 0).then_some(CategoryMatch {
                category,
                relevance_score: score,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    matches.truncate(MAX_DETECTED);

    debug!(
        "Detected {} wellness categories: {:?}",
        matches.len(),
        matches.iter().map(|m| m.category.id).collect::<Vec<_>>()
    );
    matches
}

/// Pulls supporting passages for wellness categories through the shared
/// verse retriever.
pub struct WellnessGuide {
    retriever: Arc<VerseRetriever>,
}

impl WellnessGuide {
    #[inline]
    pub fn new(retriever: Arc<VerseRetriever>) -> Self {
        Self { retriever }
    }

    /// Passages supporting a category: one retrieval per leading theme
    /// phrase, merged and deduplicated by passage id.
    #[inline]
    pub fn category_passages(&self, category_id: &str, max_results: usize) -> Vec<ScoredVerse> {
        let Some(category) = category(category_id) else {
            debug!("Unknown wellness category: {}", category_id);
            return Vec::new();
        };

        let mut merged = Vec::new();
        for phrase in category.theme_phrases.iter().take(PHRASES_PER_CATEGORY) {
            merged.extend(self.retriever.search_by_theme(phrase, max_results));
        }

        merged
            .into_iter()
            .unique_by(|verse| verse.passage.id.clone())
            .take(max_results)
            .collect()
    }
}
