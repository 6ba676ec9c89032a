// Corpus module
// Static chapter/passage reference data loaded at ingest time


use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// A single retrievable unit of text. Immutable once ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// Stable identifier, `"<chapter_id>:<index>"`
    pub id: String,
    pub chapter_id: u32,
    /// 1-based position within the chapter
    pub index: u32,
    pub text: String,
    pub translation: Option<String>,
    /// Denormalized chapter attributes, carried for retrieval convenience
    pub chapter_name: String,
    pub origin_place: String,
}

impl Passage {
    /// Text submitted to the embedding model: original text, translation,
    /// and chapter name combined so the vector carries both scripts plus
    /// the chapter label.
    #[inline]
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.text.as_str()];
        if let Some(translation) = &self.translation {
            parts.push(translation.as_str());
        }
        parts.push(self.chapter_name.as_str());
        parts
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A named grouping of passages. Static reference data.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub chapter_id: u32,
    pub name: String,
    pub origin_place: String,
    pub passage_count: u32,
    pub summary: Option<String>,
    pub themes: Vec<String>,
    pub sentiment: Option<String>,
}

/// Raw chapter record as it appears in the ingest dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub chapter_id: u32,
    pub name: String,
    #[serde(default)]
    pub origin_place: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub passages: Vec<PassageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// The full ingested collection: chapters plus their passages in source order
pub struct Corpus {
    chapters: BTreeMap<u32, Chapter>,
    passages: Vec<Passage>,
    passage_ids: HashMap<String, usize>,
}

impl Corpus {
    /// Build a corpus from raw chapter records
    #[inline]
    pub fn from_records(records: Vec<ChapterRecord>) -> Result<Self> {
        let mut chapters = BTreeMap::new();
        let mut passages = Vec::new();
        let mut passage_ids = HashMap::new();

        for record in records {
            if chapters.contains_key(&record.chapter_id) {
                bail!("Duplicate chapter id {} in corpus data", record.chapter_id);
            }

            let declared_count = record
                .passage_count
                .unwrap_or_else(|| record.passages.len() as u32);

            for (i, passage) in record.passages.iter().enumerate() {
                let index = i as u32 + 1;
                let id = format!("{}:{}", record.chapter_id, index);
                passage_ids.insert(id.clone(), passages.len());
                passages.push(Passage {
                    id,
                    chapter_id: record.chapter_id,
                    index,
                    text: passage.text.clone(),
                    translation: passage.translation.clone(),
                    chapter_name: record.name.clone(),
                    origin_place: record.origin_place.clone(),
                });
            }

            chapters.insert(
                record.chapter_id,
                Chapter {
                    chapter_id: record.chapter_id,
                    name: record.name,
                    origin_place: record.origin_place,
                    passage_count: declared_count,
                    summary: record.summary,
                    themes: record.themes,
                    sentiment: record.sentiment,
                },
            );
        }

        info!(
            "Loaded corpus with {} chapters and {} passages",
            chapters.len(),
            passages.len()
        );
        Ok(Self {
            chapters,
            passages,
            passage_ids,
        })
    }

    /// Load a corpus from a JSON file of chapter records
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read corpus file: {}", path.as_ref().display()))?;
        let records: Vec<ChapterRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse corpus file: {}", path.as_ref().display()))?;
        Self::from_records(records)
    }

    /// Write a normalized snapshot of the corpus
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let records = self.to_records();
        let content =
            serde_json::to_string_pretty(&records).context("Failed to serialize corpus")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write corpus file: {}", path.as_ref().display()))?;
        Ok(())
    }

    fn to_records(&self) -> Vec<ChapterRecord> {
        self.chapters
            .values()
            .map(|chapter| ChapterRecord {
                chapter_id: chapter.chapter_id,
                name: chapter.name.clone(),
                origin_place: chapter.origin_place.clone(),
                passage_count: Some(chapter.passage_count),
                summary: chapter.summary.clone(),
                themes: chapter.themes.clone(),
                sentiment: chapter.sentiment.clone(),
                passages: self
                    .passages
                    .iter()
                    .filter(|passage| passage.chapter_id == chapter.chapter_id)
                    .map(|passage| PassageRecord {
                        text: passage.text.clone(),
                        translation: passage.translation.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    #[inline]
    pub fn chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.values()
    }

    #[inline]
    pub fn chapter(&self, chapter_id: u32) -> Option<&Chapter> {
        self.chapters.get(&chapter_id)
    }

    #[inline]
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    #[inline]
    pub fn passage(&self, id: &str) -> Option<&Passage> {
        self.passage_ids.get(id).map(|&i| &self.passages[i])
    }

    #[inline]
    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    #[inline]
    pub fn passage_count(&self) -> usize {
        self.passages.len()
    }
}

/// Opaque text-generation capability used to produce chapter summaries
pub trait Summarizer: Send + Sync {
    fn summarize(&self, chapter: &Chapter) -> Result<String>;
}

/// Deterministic summary built from the chapter's descriptive attributes.
/// Used when no model-backed summarizer is supplied.
pub struct StaticSummarizer;

impl Summarizer for StaticSummarizer {
    #[inline]
    fn summarize(&self, chapter: &Chapter) -> Result<String> {
        Ok(static_summary(chapter))
    }
}

fn static_summary(chapter: &Chapter) -> String {
    let mut summary = format!(
        "{} is a chapter of {} passages associated with {}.",
        chapter.name, chapter.passage_count, chapter.origin_place
    );
    if !chapter.themes.is_empty() {
        summary.push_str(&format!(
            " Its central themes include {}.",
            chapter.themes.join(", ")
        ));
    }
    summary
}

/// Resolves chapter summaries, caching results for the process lifetime so
/// the same chapter always yields the same text.
pub struct SummaryCache {
    generator: Box<dyn Summarizer>,
    cache: Mutex<HashMap<u32, String>>,
}

impl SummaryCache {
    #[inline]
    pub fn new(generator: Box<dyn Summarizer>) -> Self {
        Self {
            generator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn with_static() -> Self {
        Self::new(Box::new(StaticSummarizer))
    }

    /// Summary for a chapter: the ingested summary when present, otherwise
    /// generated once and cached.
    #[inline]
    pub fn summary(&self, chapter: &Chapter) -> String {
        if let Some(summary) = &chapter.summary {
            return summary.clone();
        }

        let mut cache = self.cache.lock();
        if let Some(summary) = cache.get(&chapter.chapter_id) {
            return summary.clone();
        }

        let summary = match self.generator.summarize(chapter) {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    "Summary generation failed for chapter {}: {}",
                    chapter.chapter_id, e
                );
                static_summary(chapter)
            }
        };
        cache.insert(chapter.chapter_id, summary.clone());
        summary
    }
}
