use super::*;
use tempfile::TempDir;

fn test_metadata(chapter_id: u32, text: &str) -> VerseMetadata {
    VerseMetadata {
        id: String::new(),
        chapter_id,
        chapter_name: format!("Chapter {}", chapter_id),
        origin_place: "Test City".to_string(),
        text: text.to_string(),
        translation: None,
        added_at: None,
        updated_at: None,
        extra: BTreeMap::new(),
    }
}

fn open_test_store() -> (Arc<VectorStore>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = Arc::new(VectorStore::open(temp_dir.path()).expect("should open store"));
    (store, temp_dir)
}

#[test]
fn add_assigns_sequential_ids() {
    let (store, _temp_dir) = open_test_store();

    let ids = store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![test_metadata(1, "first"), test_metadata(1, "second")],
            None,
        )
        .expect("should add vectors");
    assert_eq!(ids, vec!["item_0", "item_1"]);

    let more = store
        .add(vec![vec![1.0, 1.0]], vec![test_metadata(2, "third")], None)
        .expect("should add more vectors");
    assert_eq!(more, vec!["item_2"]);
}

#[test]
fn add_then_get_by_id_round_trips() {
    let (store, _temp_dir) = open_test_store();

    let vector = vec![0.25, 0.5, 0.75];
    let ids = store
        .add(vec![vector.clone()], vec![test_metadata(3, "a passage")], None)
        .expect("should add vector");

    let (stored_vector, metadata) = store.get_by_id(&ids[0]).expect("should find vector");
    assert_eq!(stored_vector, vector);
    assert_eq!(metadata.id, ids[0]);
    assert_eq!(metadata.chapter_id, 3);
    assert_eq!(metadata.text, "a passage");
    assert!(metadata.added_at.is_some());
    assert!(metadata.updated_at.is_none());
}

#[test]
fn caller_supplied_ids_are_kept() {
    let (store, _temp_dir) = open_test_store();

    let ids = store
        .add(
            vec![vec![1.0, 0.0]],
            vec![test_metadata(1, "first")],
            Some(vec!["1:1".to_string()]),
        )
        .expect("should add vector");
    assert_eq!(ids, vec!["1:1"]);
    assert!(store.get_by_id("1:1").is_some());
}

#[test]
fn duplicate_ids_are_rejected() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![1.0, 0.0]],
            vec![test_metadata(1, "first")],
            Some(vec!["1:1".to_string()]),
        )
        .expect("should add vector");

    let result = store.add(
        vec![vec![0.0, 1.0]],
        vec![test_metadata(1, "again")],
        Some(vec!["1:1".to_string()]),
    );
    assert!(result.is_err());
    assert_eq!(store.len(), 1);
}

#[test]
fn dimension_mismatch_is_rejected() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(vec![vec![1.0, 0.0]], vec![test_metadata(1, "first")], None)
        .expect("should add vector");

    let result = store.add(
        vec![vec![1.0, 0.0, 0.0]],
        vec![test_metadata(1, "wrong width")],
        None,
    );
    assert!(matches!(
        result,
        Err(EngineError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    // Store unchanged after the rejected batch
    assert_eq!(store.len(), 1);
}

#[test]
fn mismatched_metadata_count_is_rejected() {
    let (store, _temp_dir) = open_test_store();

    let result = store.add(
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![test_metadata(1, "only one")],
        None,
    );
    assert!(result.is_err());
    assert!(store.is_empty());
}

#[test]
fn search_ranks_by_cosine_similarity() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]],
            vec![
                test_metadata(1, "aligned"),
                test_metadata(2, "orthogonal"),
                test_metadata(3, "close"),
            ],
            None,
        )
        .expect("should add vectors");

    let hits = store.search(&[1.0, 0.0], 2, 0.0, None);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].metadata.text, "aligned");
    assert_eq!(hits[1].metadata.text, "close");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn zero_norm_vectors_never_match() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![0.0, 0.0], vec![1.0, 0.0]],
            vec![test_metadata(1, "zero"), test_metadata(2, "unit")],
            None,
        )
        .expect("should add vectors");

    let hits = store.search(&[1.0, 0.0], 10, f32::MIN, None);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.text, "unit");
    assert!(hits.iter().all(|hit| hit.score.is_finite()));
}

#[test]
fn zero_norm_query_returns_nothing() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(vec![vec![1.0, 0.0]], vec![test_metadata(1, "unit")], None)
        .expect("should add vector");

    assert!(store.search(&[0.0, 0.0], 10, 0.0, None).is_empty());
}

#[test]
fn unreachable_similarity_threshold_returns_empty() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![1.0, 0.0], vec![0.7, 0.7]],
            vec![test_metadata(1, "a"), test_metadata(2, "b")],
            None,
        )
        .expect("should add vectors");

    let hits = store.search(&[0.0, 1.0], 3, 0.99, None);
    assert!(hits.is_empty());
}

#[test]
fn equal_scores_keep_insertion_order() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
            vec![
                test_metadata(1, "first"),
                test_metadata(2, "second"),
                test_metadata(3, "third"),
            ],
            None,
        )
        .expect("should add vectors");

    // All three have cosine similarity 1.0 against the query
    let hits = store.search(&[1.0, 0.0], 3, 0.0, None);
    let texts: Vec<&str> = hits.iter().map(|hit| hit.metadata.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[test]
fn metadata_filter_narrows_results() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(
            vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.8, 0.2]],
            vec![
                test_metadata(1, "one"),
                test_metadata(2, "two"),
                test_metadata(3, "three"),
            ],
            None,
        )
        .expect("should add vectors");

    let filter = MetadataFilter::new().equals("chapter_id", 2);
    let hits = store.search(&[1.0, 0.0], 10, 0.0, Some(&filter));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.chapter_id, 2);

    let filter = MetadataFilter::new().any_of("chapter_id", vec![1, 3]);
    let hits = store.search(&[1.0, 0.0], 10, 0.0, Some(&filter));
    assert_eq!(hits.len(), 2);

    let filter = MetadataFilter::new().equals("chapter_id", 99);
    assert!(store.search(&[1.0, 0.0], 10, 0.0, Some(&filter)).is_empty());
}

#[test]
fn delete_removes_and_rebuilds_index() {
    let (store, _temp_dir) = open_test_store();

    let ids = store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
            vec![
                test_metadata(1, "a"),
                test_metadata(2, "b"),
                test_metadata(3, "c"),
            ],
            None,
        )
        .expect("should add vectors");

    assert!(!store.delete("missing"));
    assert!(store.delete(&ids[0]));
    assert_eq!(store.len(), 2);
    assert!(store.get_by_id(&ids[0]).is_none());

    // Remaining ids still resolve to the right rows after the shift
    let (_, meta_b) = store.get_by_id(&ids[1]).expect("should find b");
    assert_eq!(meta_b.text, "b");
    let (_, meta_c) = store.get_by_id(&ids[2]).expect("should find c");
    assert_eq!(meta_c.text, "c");
}

#[test]
fn update_metadata_preserves_id_and_added_at() {
    let (store, _temp_dir) = open_test_store();

    let ids = store
        .add(vec![vec![1.0, 0.0]], vec![test_metadata(1, "original")], None)
        .expect("should add vector");
    let (_, before) = store.get_by_id(&ids[0]).expect("should find vector");

    let mut replacement = test_metadata(1, "revised");
    replacement.id = "attempted-override".to_string();
    assert!(store.update_metadata(&ids[0], replacement));

    let (_, after) = store.get_by_id(&ids[0]).expect("should find vector");
    assert_eq!(after.id, ids[0]);
    assert_eq!(after.text, "revised");
    assert_eq!(after.added_at, before.added_at);
    assert!(after.updated_at.is_some());

    assert!(!store.update_metadata("missing", test_metadata(1, "x")));
}

#[test]
fn save_then_load_reproduces_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    let ids = store
        .add(
            vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]],
            vec![test_metadata(1, "first"), test_metadata(2, "second")],
            Some(vec!["1:1".to_string(), "2:1".to_string()]),
        )
        .expect("should add vectors");
    store.save().expect("should save store");

    let restored = VectorStore::open(temp_dir.path()).expect("should reopen store");
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.dimension(), Some(3));

    for id in &ids {
        let (original_vector, original_meta) = store.get_by_id(id).expect("should find original");
        let (vector, metadata) = restored.get_by_id(id).expect("should find restored");
        assert_eq!(vector, original_vector);
        assert_eq!(metadata, original_meta);
    }
}

#[test]
fn load_tolerates_missing_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let store = VectorStore::open(temp_dir.path()).expect("should open fresh store");
    assert!(store.is_empty());
    assert_eq!(store.dimension(), None);
}

#[test]
fn inconsistent_artifacts_reset_the_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let store = VectorStore::open(temp_dir.path()).expect("should open store");
    store
        .add(
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![test_metadata(1, "a"), test_metadata(2, "b")],
            None,
        )
        .expect("should add vectors");
    store.save().expect("should save store");

    // Simulate a crash between artifact writes
    fs::write(temp_dir.path().join(METADATA_FILE), "[]").expect("should truncate metadata");

    let store = VectorStore::open(temp_dir.path()).expect("should reopen store");
    assert!(store.is_empty());
    assert!(store.search(&[1.0, 0.0], 5, 0.0, None).is_empty());
}

#[test]
fn clear_resets_everything() {
    let (store, _temp_dir) = open_test_store();

    store
        .add(vec![vec![1.0, 0.0]], vec![test_metadata(1, "a")], None)
        .expect("should add vector");
    store.clear();

    assert!(store.is_empty());
    assert_eq!(store.dimension(), None);
    // A new dimension can be established after clearing
    store
        .add(vec![vec![1.0, 2.0, 3.0]], vec![test_metadata(1, "b")], None)
        .expect("should add wider vector");
    assert_eq!(store.dimension(), Some(3));
}

#[test]
fn stats_reflect_disk_artifacts() {
    let (store, _temp_dir) = open_test_store();

    let stats = store.stats();
    assert_eq!(stats.num_vectors, 0);
    assert!(!stats.vectors_file_exists);

    store
        .add(vec![vec![1.0, 0.0]], vec![test_metadata(1, "a")], None)
        .expect("should add vector");
    store.save().expect("should save store");

    let stats = store.stats();
    assert_eq!(stats.num_vectors, 1);
    assert_eq!(stats.dimension, Some(2));
    assert!(stats.vectors_file_exists);
    assert!(stats.metadata_file_exists);
    assert!(stats.index_file_exists);
}

#[test]
fn manager_reuses_open_stores() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let manager = StoreManager::new(temp_dir.path());

    let first = manager.store("verses").expect("should open store");
    first
        .add(vec![vec![1.0]], vec![test_metadata(1, "a")], None)
        .expect("should add vector");

    let second = manager.store("verses").expect("should reuse store");
    assert_eq!(second.len(), 1);

    let other = manager.store("summaries").expect("should open second store");
    assert!(other.is_empty());
    assert_eq!(manager.all_stats().len(), 2);

    let outcomes = manager.save_all();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, result)| result.is_ok()));
    assert!(temp_dir.path().join("verses").join(METADATA_FILE).exists());
}
