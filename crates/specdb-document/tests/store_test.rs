//! End-to-end tests for the document store
//!
//! Drives the public Store API through CRUD, upsert, uniqueness and index
//! management flows.

use serde::Deserialize;
use serde_json::json;
use specdb_document::{
    Document, FindOptions, IndexOptions, MemoryStore, Sort, SpecdbError, Store, UpdateOptions,
    Value,
};

fn doc(json: serde_json::Value) -> Document {
    Document::from_json(json).unwrap()
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Run a find and return the ids of the results in cursor order.
async fn find_ids(store: &MemoryStore, filter: serde_json::Value) -> Vec<Value> {
    store
        .find(&doc(filter), FindOptions::default())
        .await
        .unwrap()
        .collect_documents()
        .into_iter()
        .filter_map(|d| d.id().cloned())
        .collect()
}

#[derive(Debug, Deserialize, PartialEq)]
struct Profile {
    id: String,
    name: String,
    version: i64,
}

#[tokio::test]
async fn test_crud_lifecycle() {
    let store = MemoryStore::new();

    store
        .insert(vec![doc(json!({"id": "a", "name": "Alice", "version": 1}))])
        .await
        .unwrap();

    let mut cursor = store
        .find(&doc(json!({"version": {"$gte": 1}})), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(cursor.remaining(), 1);

    let count = store
        .update(
            &doc(json!({"id": "a"})),
            &doc(json!({"$set": {"version": 2}})),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(count, 1);

    cursor = store
        .find(&doc(json!({"version": 2})), FindOptions::default())
        .await
        .unwrap();
    assert!(cursor.next());
    let profile: Profile = cursor.decode().unwrap();
    assert_eq!(
        profile,
        Profile {
            id: "a".to_string(),
            name: "Alice".to_string(),
            version: 2,
        }
    );
    assert!(!cursor.next());

    let count = store.delete(&doc(json!({"id": "a"}))).await.unwrap();
    assert_eq!(count, 1);
    assert!(find_ids(&store, json!({})).await.is_empty());
}

#[tokio::test]
async fn test_upsert_inserts_once_then_updates() {
    let store = MemoryStore::new();
    let filter = doc(json!({"id": {"$eq": "x"}}));

    let count = store
        .update(
            &filter,
            &doc(json!({"$set": {"hits": 1}})),
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(store.len(), 1);

    let count = store
        .update(
            &filter,
            &doc(json!({"$set": {"hits": 2}})),
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.load(&"x".into()).unwrap(),
        doc(json!({"id": "x", "hits": 2}))
    );
}

#[tokio::test]
async fn test_unique_index_rejects_duplicates() {
    let store = MemoryStore::new();
    store
        .index(&keys(&["email"]), IndexOptions::unique())
        .await
        .unwrap();

    store
        .insert(vec![doc(json!({"id": 1, "email": "a@example.com"}))])
        .await
        .unwrap();

    let err = store
        .insert(vec![doc(json!({"id": 2, "email": "a@example.com"}))])
        .await
        .unwrap_err();
    assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
    assert_eq!(store.len(), 1);

    // an update that would collide is rejected and leaves the target intact
    store
        .insert(vec![doc(json!({"id": 3, "email": "c@example.com"}))])
        .await
        .unwrap();
    let err = store
        .update(
            &doc(json!({"id": 3})),
            &doc(json!({"$set": {"email": "a@example.com"}})),
            UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
    assert_eq!(
        store.load(&Value::Int(3)).unwrap().get("email"),
        Some(&Value::from("c@example.com"))
    );
}

#[tokio::test]
async fn test_insert_batch_is_not_transactional() {
    let store = MemoryStore::new();
    let err = store
        .insert(vec![
            doc(json!({"id": "a"})),
            doc(json!({"id": "b"})),
            doc(json!({"id": "a"})),
            doc(json!({"id": "c"})),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
    assert_eq!(
        find_ids(&store, json!({})).await,
        vec![Value::from("a"), Value::from("b")]
    );
}

#[tokio::test]
async fn test_insert_without_id() {
    let store = MemoryStore::new();
    let err = store.insert(vec![doc(json!({"name": "n"}))]).await.unwrap_err();
    assert_eq!(err, SpecdbError::KeyMissing("id".to_string()));
}

#[tokio::test]
async fn test_deleted_documents_are_gone_from_every_path() {
    let store = MemoryStore::new();
    store
        .index(&keys(&["kind", "rank"]), IndexOptions::default())
        .await
        .unwrap();
    store
        .insert(vec![
            doc(json!({"id": "a", "kind": "k", "rank": 1})),
            doc(json!({"id": "b", "kind": "k", "rank": 2})),
        ])
        .await
        .unwrap();

    store.delete(&doc(json!({"id": "a"}))).await.unwrap();

    assert!(matches!(
        store.load(&"a".into()),
        Err(SpecdbError::KeyNotFound(_))
    ));
    assert_eq!(
        find_ids(&store, json!({"kind": "k"})).await,
        vec![Value::from("b")]
    );
    assert_eq!(
        find_ids(&store, json!({"kind": "k", "rank": 1})).await,
        Vec::<Value>::new()
    );
}

#[tokio::test]
async fn test_index_unindex_round_trip() {
    let store = MemoryStore::new();
    store
        .insert(vec![
            doc(json!({"id": 1, "tier": "gold"})),
            doc(json!({"id": 2, "tier": "silver"})),
            doc(json!({"id": 3, "tier": "gold"})),
        ])
        .await
        .unwrap();

    let filter = json!({"tier": "gold"});
    let before = find_ids(&store, filter.clone()).await;
    let indexes_before = store.indexes();

    store
        .index(&keys(&["tier"]), IndexOptions::default())
        .await
        .unwrap();
    assert!(store.explain(&doc(filter.clone())).is_some());
    assert_eq!(find_ids(&store, filter.clone()).await, before);

    store.unindex(&keys(&["tier"])).await.unwrap();
    assert!(store.explain(&doc(filter.clone())).is_none());
    assert_eq!(find_ids(&store, filter).await, before);
    assert_eq!(store.indexes(), indexes_before);
}

#[tokio::test]
async fn test_sorted_find_over_index() {
    let store = MemoryStore::new();
    store
        .index(&keys(&["score"]), IndexOptions::default())
        .await
        .unwrap();
    let docs = (0..10)
        .map(|i| doc(json!({"id": i, "score": (i * 7) % 10})))
        .collect();
    store.insert(docs).await.unwrap();

    let cursor = store
        .find(
            &doc(json!({"score": {"$gte": 5}})),
            FindOptions::new().sort(Sort::desc("score")).limit(3),
        )
        .await
        .unwrap();
    let scores: Vec<_> = cursor
        .collect_documents()
        .iter()
        .filter_map(|d| d.get("score").and_then(Value::as_i64))
        .collect();
    assert_eq!(scores, vec![9, 8, 7]);
}

#[tokio::test]
async fn test_store_as_trait_object() {
    let store: Box<dyn Store> = Box::new(MemoryStore::new());
    store
        .insert(vec![doc(json!({"id": "a"}))])
        .await
        .unwrap();
    let cursor = store
        .find(&Document::new(), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(cursor.remaining(), 1);
}
