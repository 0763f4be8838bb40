//! Tests for lodharvest-store: partition lifecycle, lastmod tracking and the cleaning decorator

use chrono::{Duration, Utc};
use lodharvest_core::{fact, iri, Error, Fact, Literal, Term};
use lodharvest_store::*;
use std::sync::Arc;

fn triple(s: &str, p: &str, o: &str) -> Fact {
    fact(
        iri(s).unwrap(),
        iri(p).unwrap(),
        Literal::new_simple_literal(o),
    )
}

fn memory() -> MemoryGraphStore {
    MemoryGraphStore::new().unwrap()
}

const ALL: &str = "SELECT ?s ?p ?o WHERE { ?s ?p ?o }";

// ===========================================================================
// Insert / select
// ===========================================================================

#[tokio::test]
async fn insert_then_select_partition_returns_exactly_that_triple() {
    let store = memory();
    let t = triple("https://example.org/s", "https://example.org/p", "o");
    store.insert(vec![t.clone()], Some("urn:test:1")).await.unwrap();

    let rs = store.select(ALL, Some("urn:test:1")).await.unwrap();
    assert_eq!(rs.len(), 1);
    let row = &rs.rows()[0];
    assert_eq!(row["s"], Term::from(iri("https://example.org/s").unwrap()));
    assert_eq!(row["p"], Term::from(iri("https://example.org/p").unwrap()));
    assert_eq!(row["o"], Term::from(Literal::new_simple_literal("o")));

    let age = store.age_of("urn:test:1").await.unwrap().unwrap();
    assert!(age >= Duration::zero());
    assert!(age < Duration::seconds(5));
}

#[tokio::test]
async fn select_is_scoped_to_partition() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("one"))
        .await
        .unwrap();
    store
        .insert(vec![triple("https://example.org/b", "https://example.org/p", "2")], Some("two"))
        .await
        .unwrap();

    assert_eq!(store.select(ALL, Some("one")).await.unwrap().len(), 1);
    assert_eq!(store.select(ALL, Some("two")).await.unwrap().len(), 1);

    let whole = store
        .select("SELECT ?s WHERE { ?s <https://example.org/p> ?o }", None)
        .await
        .unwrap();
    assert_eq!(whole.len(), 2);
}

#[tokio::test]
async fn ask_queries_return_boolean() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();
    let rs = store
        .select("ASK { <https://example.org/a> <https://example.org/p> ?o }", None)
        .await
        .unwrap();
    assert_eq!(rs.boolean(), Some(true));
}

#[tokio::test]
async fn malformed_query_is_query_error() {
    let store = memory();
    let err = store.select("SELECT WHERE {", None).await.unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

// ===========================================================================
// Drop / forget lifecycle
// ===========================================================================

#[tokio::test]
async fn drop_keeps_lastmod_entry() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();
    store.drop_partition("k").await.unwrap();

    assert!(store.select(ALL, Some("k")).await.unwrap().is_empty());
    assert_eq!(store.known_keys().await.unwrap(), vec!["k".to_string()]);
    assert!(store.lastmod("k").await.unwrap().is_some());
}

#[tokio::test]
async fn cleaning_store_cleans_replacements() {
    let inner: Arc<dyn GraphStore> = Arc::new(memory());
    let store = CleaningStore::new(inner.clone());
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "old")], Some("k"))
        .await
        .unwrap();
    store
        .replace_partition(
            "k",
            vec![
                triple("https://example.org/a", "https://example.org/p", "new"),
                triple("https://example.org/a", "https://example.org/p", " "),
            ],
        )
        .await
        .unwrap();

    let rs = inner.select("SELECT ?o WHERE { ?s ?p ?o }", Some("k")).await.unwrap();
    let objects: Vec<String> = rs.column("o").map(|t| t.to_string()).collect();
    assert_eq!(objects, vec!["\"new\"".to_string()]);
}

#[tokio::test]
async fn forget_removes_tracking_but_not_content() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("urn:test:1"))
        .await
        .unwrap();
    store.forget("urn:test:1").await.unwrap();

    assert!(store.known_keys().await.unwrap().is_empty());
    assert!(store.age_of("urn:test:1").await.unwrap().is_none());
    assert_eq!(store.select(ALL, Some("urn:test:1")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn drop_and_forget_unknown_keys_are_noops() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("known"))
        .await
        .unwrap();
    let before = store.known_keys().await.unwrap();

    store.forget("never-seen").await.unwrap();
    store.forget("never-seen").await.unwrap();
    assert_eq!(store.known_keys().await.unwrap(), before);

    store.drop_partition("never-seen").await.unwrap();
    store.drop_partition("never-seen").await.unwrap();
    assert_eq!(store.known_keys().await.unwrap(), before);
    assert!(store.lastmod("never-seen").await.unwrap().is_none());
}

#[tokio::test]
async fn lastmod_is_monotonic_over_insert_and_drop() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let before = store.age_of("k").await.unwrap().unwrap();
    store
        .insert(vec![triple("https://example.org/b", "https://example.org/p", "2")], Some("k"))
        .await
        .unwrap();
    let after_insert = store.age_of("k").await.unwrap().unwrap();
    assert!(after_insert <= before);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let before = store.age_of("k").await.unwrap().unwrap();
    store.drop_partition("k").await.unwrap();
    let after_drop = store.age_of("k").await.unwrap().unwrap();
    assert!(after_drop <= before);
}

#[tokio::test]
async fn keys_roundtrip_through_known_keys() {
    let store = memory();
    let keys = ["configs/harvest.yml", "https://example.org/x?y=1", "task one"];
    for key in keys {
        store
            .insert(vec![triple("https://example.org/a", "https://example.org/p", key)], Some(key))
            .await
            .unwrap();
    }
    let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    expected.sort();
    assert_eq!(store.known_keys().await.unwrap(), expected);
}

// ===========================================================================
// Staleness
// ===========================================================================

#[tokio::test]
async fn verify_max_age_unknown_is_false() {
    let store = memory();
    assert!(!store.verify_max_age("nope", 60, Utc::now()).await);
}

#[tokio::test]
async fn verify_max_age_tracks_threshold() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();
    let now = Utc::now();
    assert!(store.verify_max_age("k", 5, now).await);
    assert!(!store.verify_max_age("k", 5, now + Duration::minutes(10)).await);
    assert!(!store.verify_max_age("k", 0, now).await);
}

#[tokio::test]
async fn verify_max_age_accepts_huge_thresholds() {
    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();
    let now = Utc::now();
    assert!(store.verify_max_age("k", u64::MAX, now).await);
    assert!(store.verify_max_age("k", i64::MAX as u64, now + Duration::days(365)).await);
    assert!(!store.verify_max_age("nope", u64::MAX, now).await);
}

// ===========================================================================
// Read-only
// ===========================================================================

#[tokio::test]
async fn read_only_store_rejects_writes() {
    let store = memory().read_only();
    assert!(store.is_read_only());
    let err = store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnly(_)));
    assert!(matches!(store.drop_partition("k").await.unwrap_err(), Error::ReadOnly(_)));
    assert!(matches!(store.forget("k").await.unwrap_err(), Error::ReadOnly(_)));
    // reads still work
    assert!(store.select(ALL, None).await.unwrap().is_empty());
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test]
async fn concurrent_inserts_into_one_partition_lose_nothing() {
    let store = Arc::new(memory());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert(
                    vec![triple("https://example.org/a", "https://example.org/p", &i.to_string())],
                    Some("shared"),
                )
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(store.select(ALL, Some("shared")).await.unwrap().len(), 16);
    assert_eq!(store.known_keys().await.unwrap(), vec!["shared".to_string()]);
}

// ===========================================================================
// Cleaning decorator
// ===========================================================================

#[tokio::test]
async fn cleaning_store_filters_then_delegates() {
    let inner: Arc<dyn GraphStore> = Arc::new(memory());
    let store = CleaningStore::new(inner.clone());
    store
        .insert(
            vec![
                triple("https://example.org/a", "https://example.org/p", "kept"),
                triple("https://example.org/a", "https://example.org/p", "kept"),
                triple("https://example.org/a", "https://example.org/p", ""),
            ],
            Some("k"),
        )
        .await
        .unwrap();

    assert_eq!(inner.select(ALL, Some("k")).await.unwrap().len(), 1);
    assert_eq!(store.known_keys().await.unwrap(), vec!["k".to_string()]);
    assert!(store.lastmod("k").await.unwrap().is_some());
}

// ===========================================================================
// State file
// ===========================================================================

#[tokio::test]
async fn state_file_restores_partitions_and_lastmods() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.nq");

    let store = memory();
    store
        .insert(vec![triple("https://example.org/a", "https://example.org/p", "1")], Some("k"))
        .await
        .unwrap();
    store.dump_nquads(std::fs::File::create(&path).unwrap()).unwrap();

    let restored = memory();
    restored.load_nquads(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(restored.select(ALL, Some("k")).await.unwrap().len(), 1);
    assert_eq!(restored.lastmod("k").await.unwrap(), store.lastmod("k").await.unwrap());
}
