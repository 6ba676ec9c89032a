//! Theme lexicon and lexical scoring corrections.
//!
//! Embedding models tend to under-weight exact lexical matches, so verse
//! similarities get a small boost per query keyword found verbatim in the
//! passage, and a separate contextual score estimates how directly a
//! passage speaks to the query.

use std::collections::BTreeSet;

use crate::config::ScoringConfig;

/// Short function words excluded from keyword extraction
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "your", "about", "into", "over", "what",
    "when", "where", "how", "who", "are", "was", "were", "has", "have", "had", "you", "our",
    "their", "them", "they", "his", "her", "its", "not", "but", "all", "any", "can", "will",
    "may", "should",
];

/// Concept patterns scanned against passage text. A concept counts as found
/// when any of its pattern words appears as a substring.
const THEME_PATTERNS: &[(&str, &[&str])] = &[
    (
        "prayer",
        &["prayer", "pray", "worship", "devotion", "supplicat", "invoke", "bow"],
    ),
    (
        "guidance",
        &["guidance", "guide", "path", "straight", "direction", "lead"],
    ),
    (
        "mercy",
        &["mercy", "merciful", "compassion", "kindness", "grace"],
    ),
    (
        "patience",
        &["patience", "patient", "persever", "endur", "steadfast"],
    ),
    (
        "faith",
        &["faith", "believe", "believer", "belief", "trust", "conviction"],
    ),
    (
        "justice",
        &["justice", "just", "fair", "fairness", "equity", "oppress"],
    ),
    (
        "knowledge",
        &["knowledge", "know", "wisdom", "wise", "learn", "understand", "reflect"],
    ),
    (
        "charity",
        &["charity", "give", "giving", "generous", "generosity", "spend", "poor", "needy"],
    ),
    (
        "forgiveness",
        &["forgiveness", "forgive", "pardon", "repent", "repentance"],
    ),
    (
        "gratitude",
        &["gratitude", "grateful", "thank", "thankful", "blessing", "praise"],
    ),
];

/// Words in the query that indicate a concept without naming it. A passage
/// naming the concept gets a contextual bonus when the query carries one of
/// its indicators.
const INDICATOR_WORDS: &[(&str, &[&str])] = &[
    ("prayer", &["dua", "worship", "devotion", "meditat", "ritual"]),
    ("guidance", &["direction", "lost", "confused", "advice", "help"]),
    ("mercy", &["compassion", "kindness", "forgiving", "gentle"]),
    (
        "patience",
        &["endurance", "perseverance", "waiting", "hardship", "difficult"],
    ),
    ("faith", &["belief", "trust", "doubt", "certainty", "conviction"]),
    (
        "justice",
        &["fairness", "equality", "rights", "oppression", "wrong"],
    ),
    (
        "knowledge",
        &["wisdom", "learning", "understanding", "education", "study"],
    ),
];

/// Extract searchable keywords from a free-text theme: lowercased tokens
/// longer than two characters, stop words removed, first occurrence order
/// preserved.
#[inline]
pub fn theme_keywords(theme: &str) -> Vec<String> {
    let lower = theme.to_lowercase();
    let mut seen = BTreeSet::new();
    let mut keywords = Vec::new();
    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Boost a similarity score for each query keyword found verbatim in the
/// passage, capped at 1.0.
#[inline]
pub fn boosted_similarity(
    base: f32,
    keywords: &[String],
    passage_lower: &str,
    boost_per_keyword: f32,
) -> f32 {
    let hits = keywords
        .iter()
        .filter(|keyword| passage_lower.contains(keyword.as_str()))
        .count();
    (base + boost_per_keyword * hits as f32).min(1.0)
}

/// How directly a passage addresses the theme, in [0, 1].
///
/// A verbatim occurrence of the whole theme scores `direct_match_score`
/// outright. Otherwise the score is keyword density scaled by
/// `keyword_density_scale`, plus a capped bonus for each concept the theme
/// hints at (via its indicator words) that the passage names.
#[inline]
pub fn contextual_relevance(
    theme_lower: &str,
    keywords: &[String],
    passage_lower: &str,
    scoring: &ScoringConfig,
) -> f32 {
    if !theme_lower.is_empty() && passage_lower.contains(theme_lower) {
        return scoring.direct_match_score;
    }

    let mut score = 0.0;
    if !keywords.is_empty() {
        let matched = keywords
            .iter()
            .filter(|keyword| passage_lower.contains(keyword.as_str()))
            .count();
        score += (matched as f32 / keywords.len() as f32) * scoring.keyword_density_scale;
    }

    let mut bonus = 0.0;
    for (concept, indicators) in INDICATOR_WORDS {
        if indicators
            .iter()
            .any(|indicator| theme_lower.contains(indicator))
            && passage_lower.contains(concept)
        {
            bonus += scoring.indicator_bonus;
        }
    }
    score += bonus.min(scoring.indicator_bonus_cap);

    score.min(1.0)
}

/// Concepts detected in a passage, plus the literal theme when the passage
/// quotes it.
#[inline]
pub fn extract_themes(theme_lower: &str, passage_lower: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for (concept, patterns) in THEME_PATTERNS {
        if patterns
            .iter()
            .any(|pattern| passage_lower.contains(pattern))
        {
            found.insert((*concept).to_string());
        }
    }
    if !theme_lower.is_empty() && passage_lower.contains(theme_lower) {
        found.insert(theme_lower.to_string());
    }
    found
}
