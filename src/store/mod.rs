// Vector store module
// In-memory vector index with cosine similarity search and disk persistence

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{EngineError, Result};

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";

/// Metadata stored alongside each vector.
///
/// Known passage fields are explicit; anything else rides in the flattened
/// extension map so older snapshots with extra keys keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerseMetadata {
    /// Unique identifier, assigned by the store on insert
    #[serde(default)]
    pub id: String,
    pub chapter_id: u32,
    pub chapter_name: String,
    pub origin_place: String,
    /// Original-language passage text
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    /// Set once at insertion, never changed afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl VerseMetadata {
    /// Look up a field by name, known fields first, then the extension map
    fn field(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::from(self.id.as_str())),
            "chapter_id" => Some(Value::from(self.chapter_id)),
            "chapter_name" => Some(Value::from(self.chapter_name.as_str())),
            "origin_place" => Some(Value::from(self.origin_place.as_str())),
            "text" => Some(Value::from(self.text.as_str())),
            "translation" => self.translation.as_deref().map(Value::from),
            _ => self.extra.get(key).cloned(),
        }
    }
}

/// A single filter criterion value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    One(Value),
    AnyOf(Vec<Value>),
}

/// Conjunctive metadata filter: every criterion must match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    criteria: BTreeMap<String, FilterValue>,
}

impl MetadataFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn equals<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.criteria
            .insert(key.to_string(), FilterValue::One(value.into()));
        self
    }

    #[inline]
    #[must_use]
    pub fn any_of<V: Into<Value>>(mut self, key: &str, values: Vec<V>) -> Self {
        self.criteria.insert(
            key.to_string(),
            FilterValue::AnyOf(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    fn matches(&self, metadata: &VerseMetadata) -> bool {
        self.criteria.iter().all(|(key, expected)| {
            let Some(actual) = metadata.field(key) else {
                return false;
            };
            match expected {
                FilterValue::One(value) => &actual == value,
                FilterValue::AnyOf(values) => values.contains(&actual),
            }
        })
    }
}

/// Search result from cosine similarity search
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub metadata: VerseMetadata,
    pub score: f32,
}

/// Store statistics for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub num_vectors: usize,
    pub dimension: Option<usize>,
    pub storage_dir: PathBuf,
    pub vectors_file_exists: bool,
    pub metadata_file_exists: bool,
    pub index_file_exists: bool,
}

#[derive(Default)]
struct StoreInner {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<VerseMetadata>,
    index: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl StoreInner {
    fn reset(&mut self) {
        self.vectors.clear();
        self.metadata.clear();
        self.index.clear();
        self.dimension = None;
    }

    /// The three parallel structures must stay in lockstep
    fn is_consistent(&self) -> bool {
        self.vectors.len() == self.metadata.len()
            && self.metadata.len() == self.index.len()
            && self.index.values().all(|&idx| idx < self.metadata.len())
    }
}

/// In-memory vector store with cosine similarity search and three-artifact
/// disk persistence (vector matrix, metadata list, id-to-row index).
///
/// Every public method holds the store lock for its full duration, so
/// concurrent readers and writers serialize and never observe the three
/// structures mid-mutation.
pub struct VectorStore {
    storage_dir: PathBuf,
    inner: Mutex<StoreInner>,
}

impl VectorStore {
    /// Open a store rooted at `storage_dir`, restoring any persisted state.
    ///
    /// Missing artifacts mean a fresh store; inconsistent artifacts are
    /// discarded with a diagnostic rather than raising.
    #[inline]
    pub fn open<P: AsRef<Path>>(storage_dir: P) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).map_err(|e| {
            EngineError::Store(format!(
                "Failed to create storage directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;

        let store = Self {
            storage_dir,
            inner: Mutex::new(StoreInner::default()),
        };
        store.load();
        Ok(store)
    }

    /// Bulk-insert vectors with their metadata.
    ///
    /// The first batch into an empty store establishes the dimension; later
    /// batches must match it. When `ids` is omitted, sequential `item_<n>`
    /// ids are assigned. Returns the ids in insertion order.
    #[inline]
    pub fn add(
        &self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<VerseMetadata>,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();

        if vectors.len() != metadata.len() {
            return Err(EngineError::Store(format!(
                "Number of vectors ({}) must match number of metadata entries ({})",
                vectors.len(),
                metadata.len()
            )));
        }
        if let Some(ids) = &ids {
            if ids.len() != vectors.len() {
                return Err(EngineError::Store(format!(
                    "Number of ids ({}) must match number of vectors ({})",
                    ids.len(),
                    vectors.len()
                )));
            }
        }
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = match inner.dimension {
            Some(dim) => dim,
            None => vectors[0].len(),
        };
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let assigned_ids = match ids {
            Some(ids) => ids,
            None => {
                let start = inner.metadata.len();
                (0..vectors.len()).map(|i| format!("item_{}", start + i)).collect()
            }
        };
        let mut batch_ids = std::collections::HashSet::with_capacity(assigned_ids.len());
        for id in &assigned_ids {
            if inner.index.contains_key(id) || !batch_ids.insert(id.as_str()) {
                return Err(EngineError::Store(format!("Duplicate vector id: {}", id)));
            }
        }

        let now = Utc::now();
        for ((vector, mut meta), id) in vectors.into_iter().zip(metadata).zip(assigned_ids.iter()) {
            meta.id = id.clone();
            meta.added_at = Some(now);

            inner.vectors.push(vector);
            inner.metadata.push(meta);
            let row = inner.metadata.len() - 1;
            inner.index.insert(id.clone(), row);
        }
        inner.dimension = Some(dimension);

        debug!("Added {} vectors to store", assigned_ids.len());
        Ok(assigned_ids)
    }

    /// Cosine similarity search over all stored vectors.
    ///
    /// Zero-norm vectors (stored or query) never participate, so scores are
    /// always finite. Results are filtered by `min_similarity` and the
    /// optional metadata filter, sorted descending by score with ties kept
    /// in insertion order, and truncated to `top_k`.
    #[inline]
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        min_similarity: f32,
        filter: Option<&MetadataFilter>,
    ) -> Vec<SearchHit> {
        let inner = self.inner.lock();

        if inner.vectors.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if let Some(dimension) = inner.dimension {
            if query_vector.len() != dimension {
                warn!(
                    "Query vector dimension {} does not match store dimension {}, returning no results",
                    query_vector.len(),
                    dimension
                );
                return Vec::new();
            }
        }

        let query_norm = norm(query_vector);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = Vec::new();
        for (row, vector) in inner.vectors.iter().enumerate() {
            let vector_norm = norm(vector);
            if vector_norm == 0.0 {
                continue;
            }
            let score = dot(query_vector, vector) / (vector_norm * query_norm);
            if score < min_similarity {
                continue;
            }
            if let Some(filter) = filter {
                if !filter.matches(&inner.metadata[row]) {
                    continue;
                }
            }
            scored.push((row, score));
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(row, score)| SearchHit {
                id: inner.metadata[row].id.clone(),
                metadata: inner.metadata[row].clone(),
                score,
            })
            .collect()
    }

    /// Get a vector and its metadata by id
    #[inline]
    pub fn get_by_id(&self, id: &str) -> Option<(Vec<f32>, VerseMetadata)> {
        let inner = self.inner.lock();
        let row = *inner.index.get(id)?;
        Some((inner.vectors[row].clone(), inner.metadata[row].clone()))
    }

    /// Delete a vector by id. Returns false when the id is unknown.
    ///
    /// Row positions shift after removal, so the id-to-row index is rebuilt
    /// from scratch.
    #[inline]
    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let Some(row) = inner.index.get(id).copied() else {
            return false;
        };

        inner.vectors.remove(row);
        inner.metadata.remove(row);

        // Row positions shifted, rebuild the whole mapping
        inner.index = inner
            .metadata
            .iter()
            .enumerate()
            .map(|(i, meta)| (meta.id.clone(), i))
            .collect();

        debug!("Deleted vector {}, {} remaining", id, inner.metadata.len());
        true
    }

    /// Replace metadata for a vector, preserving the immutable `id` and
    /// original `added_at`. Returns false when the id is unknown.
    #[inline]
    pub fn update_metadata(&self, id: &str, mut new_metadata: VerseMetadata) -> bool {
        let mut inner = self.inner.lock();
        let Some(row) = inner.index.get(id).copied() else {
            return false;
        };

        new_metadata.id = id.to_string();
        new_metadata.added_at = inner.metadata[row].added_at;
        new_metadata.updated_at = Some(Utc::now());
        inner.metadata[row] = new_metadata;
        true
    }

    /// Persist the store as its three artifacts
    #[inline]
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.lock();

        let encoded = bincode::serialize(&inner.vectors)
            .map_err(|e| EngineError::Store(format!("Failed to encode vector matrix: {}", e)))?;
        fs::write(self.vectors_file(), encoded)
            .map_err(|e| EngineError::Store(format!("Failed to write vector matrix: {}", e)))?;

        let metadata_json = serde_json::to_vec_pretty(&inner.metadata)
            .map_err(|e| EngineError::Store(format!("Failed to encode metadata: {}", e)))?;
        fs::write(self.metadata_file(), metadata_json)
            .map_err(|e| EngineError::Store(format!("Failed to write metadata: {}", e)))?;

        let index_json = serde_json::to_vec_pretty(&inner.index)
            .map_err(|e| EngineError::Store(format!("Failed to encode index: {}", e)))?;
        fs::write(self.index_file(), index_json)
            .map_err(|e| EngineError::Store(format!("Failed to write index: {}", e)))?;

        info!(
            "Saved {} vectors to {}",
            inner.metadata.len(),
            self.storage_dir.display()
        );
        Ok(())
    }

    /// Restore the store from disk. Returns true when a consistent snapshot
    /// was loaded.
    ///
    /// Any subset of the three artifacts may be absent (fresh or partial
    /// store). A snapshot whose artifacts disagree on length is treated as
    /// corrupt: the store comes up empty and the caller should re-ingest.
    #[inline]
    pub fn load(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.reset();

        if self.vectors_file().exists() {
            let Ok(bytes) = fs::read(self.vectors_file()) else {
                warn!("Failed to read vector matrix, starting empty");
                return false;
            };
            match bincode::deserialize::<Vec<Vec<f32>>>(&bytes) {
                Ok(vectors) => inner.vectors = vectors,
                Err(e) => {
                    warn!("Corrupt vector matrix ({}), starting empty", e);
                    return false;
                }
            }
        }

        if self.metadata_file().exists() {
            match read_json(&self.metadata_file()) {
                Some(metadata) => inner.metadata = metadata,
                None => {
                    inner.reset();
                    return false;
                }
            }
        }

        if self.index_file().exists() {
            match read_json(&self.index_file()) {
                Some(index) => inner.index = index,
                None => {
                    inner.reset();
                    return false;
                }
            }
        }

        if !inner.is_consistent() {
            warn!(
                "Store artifacts disagree ({} vectors, {} metadata, {} index entries), \
                 discarding and starting empty; re-ingest required",
                inner.vectors.len(),
                inner.metadata.len(),
                inner.index.len()
            );
            inner.reset();
            return false;
        }

        inner.dimension = inner.vectors.first().map(Vec::len);
        if let Some(dimension) = inner.dimension {
            if inner.vectors.iter().any(|v| v.len() != dimension) {
                warn!("Vector matrix has ragged rows, discarding and starting empty");
                inner.reset();
                return false;
            }
        }

        if !inner.metadata.is_empty() {
            info!(
                "Loaded {} vectors from {}",
                inner.metadata.len(),
                self.storage_dir.display()
            );
        }
        true
    }

    /// Remove all vectors, metadata, and index entries
    #[inline]
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.reset();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.inner.lock().dimension
    }

    #[inline]
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            num_vectors: inner.metadata.len(),
            dimension: inner.dimension,
            storage_dir: self.storage_dir.clone(),
            vectors_file_exists: self.vectors_file().exists(),
            metadata_file_exists: self.metadata_file().exists(),
            index_file_exists: self.index_file().exists(),
        }
    }

    fn vectors_file(&self) -> PathBuf {
        self.storage_dir.join(VECTORS_FILE)
    }

    fn metadata_file(&self) -> PathBuf {
        self.storage_dir.join(METADATA_FILE)
    }

    fn index_file(&self) -> PathBuf {
        self.storage_dir.join(INDEX_FILE)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Corrupt JSON in {} ({}), starting empty", path.display(), e);
            None
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Keeps named stores under one root directory, creating each on first use
pub struct StoreManager {
    root: PathBuf,
    stores: Mutex<HashMap<String, Arc<VectorStore>>>,
}

impl StoreManager {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Get or open the store named `name`
    #[inline]
    pub fn store(&self, name: &str) -> Result<Arc<VectorStore>> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(VectorStore::open(self.root.join(name))?);
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Persist every open store, reporting per-store outcomes
    #[inline]
    pub fn save_all(&self) -> Vec<(String, Result<()>)> {
        let stores = self.stores.lock();
        stores
            .iter()
            .map(|(name, store)| (name.clone(), store.save()))
            .collect()
    }

    #[inline]
    pub fn all_stats(&self) -> Vec<StoreStats> {
        let stores = self.stores.lock();
        stores.values().map(|store| store.stats()).collect()
    }
}
